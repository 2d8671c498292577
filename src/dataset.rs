//! Remote filesystem facade: path-oriented operations against the backend's
//! dataset service, plus the chunked/streamed transfer endpoints and the
//! asynchronous server-side archive workflow with bounded polling.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Method;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::client::{check_status, Session};
use crate::error::{Error, Result};
use crate::transfer::{ChunkReader, FlowParams};

pub const DEFAULT_LIST_LIMIT: u32 = 1000;

/// Interval between polls of an in-flight server-side archive action.
const ARCHIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Server-side archival state of a path. Anything other than `NONE` means an
/// action is still in transit, even if the destination path is already
/// observable.
pub const ZIP_STATE_DONE: &str = "NONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveAction {
    Zip,
    Unzip,
}

impl ArchiveAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveAction::Zip => "zip",
            ArchiveAction::Unzip => "unzip",
        }
    }
}

/// Stat/listing entry as reported by the backend. Fields the server omits
/// decode as `None`; in particular a missing `zipState` never compares equal
/// to [`ZIP_STATE_DONE`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetStat {
    pub name: Option<String>,
    pub path: Option<String>,
    pub zip_state: Option<String>,
    pub dir: Option<bool>,
    pub size: Option<u64>,
}

impl DatasetStat {
    /// Base name of the entry, from `name` or the last `path` segment.
    pub fn base_name(&self) -> Option<&str> {
        if let Some(name) = self.name.as_deref() {
            return Some(name);
        }
        self.path.as_deref().and_then(|p| p.rsplit('/').next())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Listing {
    items: Vec<DatasetStat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagListing {
    items: Vec<TagEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagEntry {
    name: String,
    value: String,
}

/// Seam between the orchestration engine and the remote store. The HTTP
/// facade implements it for real; tests substitute doubles.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn stat(&self, path: &str) -> Result<DatasetStat>;

    /// Existence check. Only `NotFound` means "absent"; every other failure
    /// propagates.
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, path: &str, sort_by: Option<&str>, limit: u32) -> Result<Vec<DatasetStat>>;

    /// Create a directory node. Not recursive, not idempotent: creating a
    /// path that already exists fails.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove a path and everything under it.
    async fn rm(&self, path: &str) -> Result<()>;

    /// Atomic rename as seen by this client.
    async fn mv(&self, source: &str, destination: &str) -> Result<()>;

    /// Fire off a server-side zip/unzip without waiting for completion.
    async fn request_archive(
        &self,
        path: &str,
        destination: Option<&str>,
        action: ArchiveAction,
    ) -> Result<()>;

    /// Chunked flow upload of one local file into a remote directory.
    async fn upload(&self, local_path: &Path, remote_dir: &str) -> Result<()>;

    /// Streamed download of one remote file to a local path.
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;
}

/// Request a server-side archive action and poll until it completes: the
/// expected output path must exist and the polled path's archival state must
/// be back to `NONE`. Polls at 1s granularity up to `timeout`.
pub async fn archive_blocking<D: DatasetStore + ?Sized>(
    store: &D,
    path: &str,
    destination: Option<&str>,
    action: ArchiveAction,
    timeout: Duration,
) -> Result<()> {
    store.request_archive(path, destination, action).await?;

    let expected = expected_archive_output(path, destination, action);
    let budget_secs = timeout.as_secs();
    for _ in 0..budget_secs {
        if store.exists(&expected).await? {
            let stat = store.stat(path).await?;
            if stat.zip_state.as_deref() == Some(ZIP_STATE_DONE) {
                debug!(path, action = action.as_str(), "archive action completed");
                return Ok(());
            }
        }
        tokio::time::sleep(ARCHIVE_POLL_INTERVAL).await;
    }
    Err(Error::Timeout {
        action: action.as_str(),
        path: path.to_string(),
        elapsed_secs: budget_secs,
    })
}

/// Path whose appearance signals completion of the archive action.
fn expected_archive_output(path: &str, destination: Option<&str>, action: ArchiveAction) -> String {
    match action {
        ArchiveAction::Zip => {
            let base = path.rsplit('/').next().unwrap_or(path);
            match destination {
                Some(dest) => format!("{dest}/{base}.zip"),
                None => format!("{path}.zip"),
            }
        }
        ArchiveAction::Unzip => path.strip_suffix(".zip").unwrap_or(path).to_string(),
    }
}

/// HTTP implementation of the dataset facade.
#[derive(Debug, Clone)]
pub struct DatasetApi {
    session: Session,
}

impl DatasetApi {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    fn dataset_url(&self, path: &str) -> String {
        self.session.project_url(&format!("dataset/{path}"))
    }

    /// Blocking or fire-and-forget archive action, caller's choice.
    pub async fn archive(
        &self,
        path: &str,
        destination: Option<&str>,
        action: ArchiveAction,
        block: bool,
        timeout: Duration,
    ) -> Result<()> {
        if block {
            archive_blocking(self, path, destination, action, timeout).await
        } else {
            self.request_archive(path, destination, action).await
        }
    }

    pub async fn zip(
        &self,
        path: &str,
        destination: Option<&str>,
        block: bool,
        timeout: Duration,
    ) -> Result<()> {
        self.archive(path, destination, ArchiveAction::Zip, block, timeout).await
    }

    pub async fn unzip(&self, path: &str, block: bool, timeout: Duration) -> Result<()> {
        self.archive(path, None, ArchiveAction::Unzip, block, timeout).await
    }

    pub async fn chmod(&self, path: &str, permissions: &str) -> Result<()> {
        let resp = self
            .session
            .request(Method::PUT, &self.dataset_url(path))
            .query(&[("action", "PERMISSION"), ("permissions", permissions)])
            .send()
            .await?;
        check_status(path, resp)?;
        Ok(())
    }

    /// Attach a named tag to a path. The value is stored JSON-encoded.
    pub async fn add_tag(&self, path: &str, name: &str, value: &serde_json::Value) -> Result<()> {
        let url = self.session.project_url(&format!("dataset/tags/{name}/{path}"));
        let resp = self
            .session
            .request(Method::PUT, &url)
            .body(serde_json::to_string(value)?)
            .send()
            .await?;
        check_status(path, resp)?;
        Ok(())
    }

    pub async fn delete_tag(&self, path: &str, name: &str) -> Result<()> {
        let url = self.session.project_url(&format!("dataset/tags/{name}/{path}"));
        let resp = self.session.request(Method::DELETE, &url).send().await?;
        check_status(path, resp)?;
        Ok(())
    }

    /// All tags on a path, each value decoded from its JSON-encoded string.
    pub async fn get_tags(&self, path: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let url = self.session.project_url(&format!("dataset/tags/all/{path}"));
        let resp = self.session.request(Method::GET, &url).send().await?;
        let listing: TagListing = check_status(path, resp)?.json().await?;
        listing
            .items
            .into_iter()
            .map(|tag| Ok((tag.name, serde_json::from_str(&tag.value)?)))
            .collect()
    }
}

#[async_trait]
impl DatasetStore for DatasetApi {
    async fn stat(&self, path: &str) -> Result<DatasetStat> {
        let resp = self
            .session
            .request(Method::GET, &self.dataset_url(path))
            .send()
            .await?;
        Ok(check_status(path, resp)?.json().await?)
    }

    async fn list(&self, path: &str, sort_by: Option<&str>, limit: u32) -> Result<Vec<DatasetStat>> {
        let mut query = vec![
            ("action".to_string(), "listing".to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(sort) = sort_by {
            query.push(("sort_by".to_string(), sort.to_string()));
        }
        let resp = self
            .session
            .request(Method::GET, &self.dataset_url(path))
            .query(&query)
            .send()
            .await?;
        let listing: Listing = check_status(path, resp)?.json().await?;
        Ok(listing.items)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let resp = self
            .session
            .request(Method::POST, &self.dataset_url(path))
            .query(&[
                ("action", "create"),
                ("searchable", "true"),
                ("generate_readme", "false"),
                ("type", "DATASET"),
            ])
            .send()
            .await?;
        check_status(path, resp)?;
        Ok(())
    }

    async fn rm(&self, path: &str) -> Result<()> {
        let resp = self
            .session
            .request(Method::DELETE, &self.dataset_url(path))
            .send()
            .await?;
        check_status(path, resp)?;
        Ok(())
    }

    async fn mv(&self, source: &str, destination: &str) -> Result<()> {
        let resp = self
            .session
            .request(Method::POST, &self.dataset_url(source))
            .query(&[("action", "move"), ("destination_path", destination)])
            .send()
            .await?;
        check_status(source, resp)?;
        Ok(())
    }

    async fn request_archive(
        &self,
        path: &str,
        destination: Option<&str>,
        action: ArchiveAction,
    ) -> Result<()> {
        let mut query = vec![("action".to_string(), action.as_str().to_string())];
        if let Some(dest) = destination {
            query.push(("destination_path".to_string(), dest.to_string()));
            query.push(("destination_type".to_string(), "DATASET".to_string()));
        }
        let resp = self
            .session
            .request(Method::POST, &self.dataset_url(path))
            .query(&query)
            .send()
            .await?;
        check_status(path, resp)?;
        Ok(())
    }

    async fn upload(&self, local_path: &Path, remote_dir: &str) -> Result<()> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidRecord(format!("{} has no file name", local_path.display())))?;
        let flow = FlowParams::new(file_name.clone(), size);
        let url = self.session.project_url(&format!("dataset/upload/{remote_dir}"));

        debug!(file = %file_name, size, chunks = flow.total_chunks(), remote_dir, "starting flow upload");
        let mut reader = ChunkReader::open(local_path).await?;
        while let Some(chunk) = reader.next_chunk().await? {
            let part = reqwest::multipart::Part::bytes(chunk.data.clone())
                .file_name(file_name.clone());
            let mut form = reqwest::multipart::Form::new().part("file", part);
            for (key, value) in flow.form_fields(&chunk) {
                form = form.text(key, value);
            }
            let resp = self
                .session
                .request(Method::POST, &url)
                .multipart(form)
                .send()
                .await?;
            check_status(remote_dir, resp)?;
            debug!(chunk = chunk.number, total = flow.total_chunks(), "chunk uploaded");
        }
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let url = self
            .session
            .project_url(&format!("dataset/download/with_auth/{remote_path}"));
        let resp = self
            .session
            .request(Method::GET, &url)
            .query(&[("type", "DATASET")])
            .send()
            .await?;
        let resp = check_status(remote_path, resp)?;

        // Absent Content-Length only disables progress reporting; the stream
        // terminates on its own either way.
        let total = resp.content_length();
        if total.is_none() {
            debug!(path = remote_path, "no content length; progress unavailable");
        }

        let mut file = tokio::fs::File::create(local_path).await?;
        let mut stream = resp.bytes_stream();
        let mut downloaded: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| Error::Transfer {
                path: remote_path.to_string(),
                source: e,
            })?;
            downloaded += chunk.len() as u64;
            if let Some(total) = total {
                let progress = format!("{:.1}%", downloaded as f64 / total as f64 * 100.0);
                debug!(path = remote_path, progress = %progress, "downloading");
            }
        }
        file.flush().await.map_err(|e| Error::Transfer {
            path: remote_path.to_string(),
            source: e,
        })?;
        if let Some(total) = total {
            if downloaded != total {
                warn!(path = remote_path, downloaded, total, "download ended short of content length");
            }
        }
        Ok(())
    }
}
