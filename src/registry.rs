//! Model registry facade: CRUD on model metadata records, plus the
//! user-facing [`ModelRegistry`] handle tying the facades and the engine
//! together.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tracing::warn;

use crate::client::{check_status, Session};
use crate::config::Provenance;
use crate::dataset::DatasetApi;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::{Framework, ModelRecord};

pub const DEFAULT_VERSION: u32 = 1;

/// Seam between the engine and the registry endpoint; tests substitute
/// doubles.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Persist the record; the response carries server-assigned fields back.
    async fn save(&self, record: &ModelRecord, query: &[(String, String)]) -> Result<ModelRecord>;

    /// Fetch exactly one record by name and version, `NotFound` when the
    /// filtered result set is empty.
    async fn get(&self, name: &str, version: u32) -> Result<ModelRecord>;

    /// Delete the metadata record. Artifact removal is the engine's job.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// HTTP implementation of the registry facade.
#[derive(Debug, Clone)]
pub struct ModelsApi {
    session: Session,
}

impl ModelsApi {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ModelStore for ModelsApi {
    async fn save(&self, record: &ModelRecord, query: &[(String, String)]) -> Result<ModelRecord> {
        let url = self.session.project_url("models");
        let resp = self
            .session
            .request(Method::POST, &url)
            .query(query)
            .json(record)
            .send()
            .await?;
        let body: serde_json::Value = check_status("models", resp)?.json().await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn get(&self, name: &str, version: u32) -> Result<ModelRecord> {
        let tail = format!("models/{name}");
        let url = self.session.project_url(&tail);
        let resp = self
            .session
            .request(Method::GET, &url)
            .query(&[("version", version.to_string())])
            .send()
            .await?;
        let body: serde_json::Value = check_status(&tail, resp)?.json().await?;
        // the backend answers with a {count, items} envelope for filtered
        // queries and a bare record otherwise
        let record = match body.get("items").and_then(|v| v.as_array()) {
            Some(items) => items.first().cloned().ok_or(Error::NotFound {
                path: format!("{tail}?version={version}"),
            })?,
            None => body,
        };
        Ok(serde_json::from_value(record)?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let tail = format!("models/{name}");
        let url = self.session.project_url(&tail);
        let resp = self.session.request(Method::DELETE, &url).send().await?;
        check_status(&tail, resp)?;
        Ok(())
    }
}

/// Handle to one project's model registry. Owns the HTTP facades and the
/// provenance context; all orchestration goes through [`Engine`].
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    datasets: DatasetApi,
    models: ModelsApi,
    provenance: Provenance,
}

impl ModelRegistry {
    pub fn new(session: Session, provenance: Provenance) -> Self {
        Self {
            datasets: DatasetApi::new(session.clone()),
            models: ModelsApi::new(session),
            provenance,
        }
    }

    fn engine(&self) -> Engine<'_, DatasetApi, ModelsApi> {
        Engine::new(&self.datasets, &self.models, self.provenance.clone())
    }

    /// Draft record ready to be saved; the version is allocated during save.
    pub fn create_model(&self, name: impl Into<String>, framework: Framework) -> ModelRecord {
        ModelRecord::new(name, framework)
    }

    /// Fetch a model's metadata handle. A missing version defaults to
    /// [`DEFAULT_VERSION`] with a warning.
    pub async fn get_model(&self, name: &str, version: Option<u32>) -> Result<ModelRecord> {
        let version = match version {
            Some(v) => v,
            None => {
                warn!(model = name, default = DEFAULT_VERSION, "no version given, defaulting");
                DEFAULT_VERSION
            }
        };
        self.models.get(name, version).await
    }

    /// Save a trained model's artifact directory under a newly allocated (or
    /// caller-pinned) version. See [`Engine::save`] for the sequence.
    pub async fn save_model(
        &self,
        record: &mut ModelRecord,
        artifact_dir: &Path,
        await_registration: Duration,
    ) -> Result<Option<ModelRecord>> {
        self.engine().save(record, artifact_dir, await_registration).await
    }

    /// Download a model version's artifacts to a fresh local staging
    /// directory and return its path.
    pub async fn download_model(&self, record: &ModelRecord) -> Result<PathBuf> {
        self.engine().download(record).await
    }

    /// Delete a model version: registry record and artifact directory both.
    pub async fn delete_model(&self, record: &ModelRecord) -> Result<()> {
        self.engine().delete(record).await
    }

    pub fn datasets(&self) -> &DatasetApi {
        &self.datasets
    }

    pub fn models(&self) -> &ModelsApi {
        &self.models
    }
}
