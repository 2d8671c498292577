//! HTTP session handle. One `Session` is constructed from a [`ClientConfig`]
//! and passed explicitly into each facade; there is no global client state.

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Session {
    http: reqwest::Client,
    base_url: String,
    project_id: u64,
    api_key: String,
}

impl Session {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            project_id: cfg.project_id,
            api_key: cfg.api_key.clone(),
        })
    }

    /// Absolute URL for a project-scoped endpoint tail such as
    /// `dataset/Models/mnist` or `models`.
    pub fn project_url(&self, tail: &str) -> String {
        format!("{}/project/{}/{}", self.base_url, self.project_id, tail)
    }

    /// Request builder with the session's auth header applied.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header(AUTHORIZATION, format!("ApiKey {}", self.api_key))
        }
    }
}

/// Map a non-success status to the error taxonomy. 404 is the only status
/// allowed to mean "absent"; 409 means a conflicting node already exists.
pub(crate) fn check_status(path: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(Error::NotFound { path: path.to_string() }),
        StatusCode::CONFLICT => Err(Error::AlreadyExists { path: path.to_string() }),
        _ => Err(Error::RequestFailed {
            path: path.to_string(),
            status: status.as_u16(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_url_shape() {
        let cfg = ClientConfig {
            base_url: "https://host/api/".into(),
            api_key: String::new(),
            project_id: 119,
            job_name: None,
            kernel_id: None,
            experiment_id: None,
        };
        let session = Session::new(&cfg).unwrap();
        assert_eq!(
            session.project_url("dataset/Models/demo"),
            "https://host/api/project/119/dataset/Models/demo"
        );
    }
}
