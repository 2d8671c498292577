//! Client configuration loaded from the environment via the `config` crate.
//!
//! All keys use the `MODELHUB` prefix with `__` as separator, e.g.
//! `MODELHUB__BASE_URL`, `MODELHUB__PROJECT_ID`, `MODELHUB__JOB_NAME`.

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend REST API, e.g. `https://host/api`.
    pub base_url: String,
    /// API key sent as `Authorization: ApiKey <key>`. Empty disables the header.
    #[serde(default)]
    pub api_key: String,
    /// Numeric project id scoping every dataset and registry endpoint.
    pub project_id: u64,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub kernel_id: Option<String>,
    #[serde(default)]
    pub experiment_id: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .set_default("base_url", "http://localhost:8080/api")?
            .set_default("api_key", "")?
            .set_default("project_id", 0i64)?
            .add_source(config::Environment::with_prefix("MODELHUB").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Provenance fields stamped onto registered records.
    pub fn provenance(&self) -> Provenance {
        Provenance {
            job_name: self.job_name.clone(),
            kernel_id: self.kernel_id.clone(),
            experiment_id: self.experiment_id.clone(),
        }
    }
}

/// Execution-context identifiers attached to model registration requests.
/// All optional; absent outside the managed environment.
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub job_name: Option<String>,
    pub kernel_id: Option<String>,
    pub experiment_id: Option<String>,
}

impl Provenance {
    /// Query parameters merged into the registration call, keyed the way the
    /// backend expects them.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(job) = &self.job_name {
            params.push(("jobName".to_string(), job.clone()));
        } else if let Some(kernel) = &self.kernel_id {
            params.push(("kernelId".to_string(), kernel.clone()));
        }
        if let Some(experiment) = &self.experiment_id {
            params.push(("experimentId".to_string(), experiment.clone()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let cfg = ClientConfig::from_env().unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8080/api");
        assert_eq!(cfg.project_id, 0);
        assert!(cfg.api_key.is_empty());
        assert!(cfg.job_name.is_none());
    }

    #[test]
    fn job_name_wins_over_kernel_id() {
        let prov = Provenance {
            job_name: Some("train_job".into()),
            kernel_id: Some("k-123".into()),
            experiment_id: Some("42".into()),
        };
        let params = prov.query_params();
        assert_eq!(
            params,
            vec![
                ("jobName".to_string(), "train_job".to_string()),
                ("experimentId".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn kernel_id_used_when_no_job() {
        let prov = Provenance {
            kernel_id: Some("k-123".into()),
            ..Default::default()
        };
        assert_eq!(
            prov.query_params(),
            vec![("kernelId".to_string(), "k-123".to_string())]
        );
    }
}
