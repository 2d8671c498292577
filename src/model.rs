//! Model metadata record and its side artifacts.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::DatasetStore;
use crate::error::Result;
use crate::signature::Signature;

/// Metadata record for one model version. `(name, version)` is unique in the
/// registry; once persisted the version never changes. A draft built client
/// side may leave `version` unset and have it allocated during save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub framework: Framework,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_example: Option<SideArtifact<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SideArtifact<Signature>>,
}

impl ModelRecord {
    pub fn new(name: impl Into<String>, framework: Framework) -> Self {
        Self {
            name: name.into(),
            framework,
            ..Default::default()
        }
    }

    /// Remote namespace holding every version of this model.
    pub fn namespace(&self) -> String {
        format!("Models/{}", self.name)
    }

    /// Remote directory of this record's version. Errors if the version has
    /// not been allocated yet.
    pub fn version_dir(&self) -> Result<String> {
        let version = self.version.ok_or_else(|| {
            crate::error::Error::InvalidRecord(format!("model {} has no version", self.name))
        })?;
        Ok(format!("Models/{}/{}", self.name, version))
    }

    /// Adopt server-assigned fields from a registration response without
    /// discarding locally staged state (side-artifact paths in particular).
    pub fn merge_server_fields(&mut self, server: ModelRecord) {
        if server.created.is_some() {
            self.created = server.created;
        }
        if server.environment.is_some() {
            self.environment = server.environment;
        }
        if server.experiment_id.is_some() {
            self.experiment_id = server.experiment_id;
        }
        if server.experiment_project_name.is_some() {
            self.experiment_project_name = server.experiment_project_name;
        }
    }
}

/// Closed set of supported model flavors, picked explicitly at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Framework {
    #[default]
    Generic,
    Tensorflow,
    Python,
    Sklearn,
}

/// Two-state side artifact: either still inline in the record, or already
/// persisted remotely and referenced by path. Reading an `Unresolved` value
/// goes through [`SideArtifact::resolve`], which never mutates the record.
///
/// The representation is untagged and `Unresolved` is tried first, so any
/// bare JSON string deserializes as a remote path. A `Resolved` value whose
/// payload is itself a bare string therefore reads back as `Unresolved`;
/// inline string payloads must be wrapped in an array or object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SideArtifact<T> {
    Unresolved(String),
    Resolved(T),
}

impl<T: DeserializeOwned + Clone> SideArtifact<T> {
    /// Return the value, downloading and decoding the remote JSON file when
    /// this artifact has been staged to the store.
    pub async fn resolve<D: DatasetStore + ?Sized>(&self, store: &D) -> Result<T> {
        match self {
            SideArtifact::Resolved(value) => Ok(value.clone()),
            SideArtifact::Unresolved(remote_path) => {
                let scratch = tempfile::tempdir()?;
                let file_name = Path::new(remote_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "artifact.json".to_string());
                let local = scratch.path().join(file_name);
                store.download(remote_path, &local).await?;
                let bytes = tokio::fs::read(&local).await?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }
}
