//! Save/download orchestration: version allocation, metadata registration,
//! artifact packaging, transfer, server-side unpacking and relocation.
//!
//! The remote store offers no transactions, so the sequence is built to
//! tolerate partial failure: the uniqueness preconditions (steps 1-3 of
//! save) fail fast, only the post-unzip relocation retries, and every other
//! error aborts the operation leaving the partial remote state in place and
//! named in the error. Local temporary state always lives in scoped
//! `TempDir`s so it is reclaimed on every exit path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::archive;
use crate::config::Provenance;
use crate::dataset::{
    archive_blocking, ArchiveAction, DatasetStat, DatasetStore, DEFAULT_LIST_LIMIT,
};
use crate::error::{Error, Result};
use crate::model::{ModelRecord, SideArtifact};
use crate::registry::ModelStore;

/// Budget for a blocking server-side zip/unzip.
pub const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(480);

const MOVE_ATTEMPTS: u32 = 3;
const MOVE_BACKOFF: Duration = Duration::from_secs(1);
const REGISTRATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Listing sort used by the version scan.
const VERSION_SORT: &str = "NAME:desc";

/// Orchestrates save/download/delete against injected store handles. Borrows
/// the facades for the duration of a call and retains nothing.
pub struct Engine<'a, D: ?Sized, M: ?Sized> {
    datasets: &'a D,
    models: &'a M,
    provenance: Provenance,
}

impl<'a, D, M> Engine<'a, D, M>
where
    D: DatasetStore + ?Sized,
    M: ModelStore + ?Sized,
{
    pub fn new(datasets: &'a D, models: &'a M, provenance: Provenance) -> Self {
        Self {
            datasets,
            models,
            provenance,
        }
    }

    /// Save `artifact_dir` as a new version of `record`'s model.
    ///
    /// Allocates the next version when the record carries none, registers the
    /// metadata, ships the artifacts as one archive, unpacks them remotely
    /// and relocates them into the version directory. With a non-zero
    /// `await_registration` the call then polls the registry until the record
    /// is visible, returning `None` (with a warning) if it never appears
    /// within the budget.
    pub async fn save(
        &self,
        record: &mut ModelRecord,
        artifact_dir: &Path,
        await_registration: Duration,
    ) -> Result<Option<ModelRecord>> {
        // 1. namespace ensure
        let namespace = record.namespace();
        if !self.datasets.exists(&namespace).await? {
            self.datasets.mkdir(&namespace).await?;
            info!(path = %namespace, "created model namespace");
        }

        // 2. version resolution: best-effort scan, not a transactional
        // counter; a concurrent unversioned save is caught by step 3
        if record.version.is_none() {
            let entries = self
                .datasets
                .list(&namespace, Some(VERSION_SORT), DEFAULT_LIST_LIMIT)
                .await?;
            let version = next_version(&entries);
            info!(model = %record.name, version, "allocated next model version");
            record.version = Some(version);
        }

        // 3. version directory creation, fail-fast on conflict
        let version_dir = record.version_dir()?;
        if self.datasets.exists(&version_dir).await? {
            return Err(Error::AlreadyExists { path: version_dir });
        }
        self.datasets.mkdir(&version_dir).await?;

        // 4. side-artifact staging
        self.stage_side_artifacts(record, &version_dir).await?;

        // 5. metadata registration with provenance context
        let query = self.provenance.query_params();
        if record.experiment_id.is_none() {
            record.experiment_id = self.provenance.experiment_id.clone();
        }
        let server_record = self.models.save(record, &query).await?;
        record.merge_server_fields(server_record);
        info!(model = %record.name, version = record.version, "model metadata registered");

        // 6. bulk artifact transfer
        self.transfer_artifacts(artifact_dir, &version_dir).await?;
        info!(model = %record.name, path = %version_dir, "artifacts in place");

        // 7. optional registration confirmation
        if await_registration.is_zero() {
            return Ok(Some(record.clone()));
        }
        self.await_registration(record, await_registration).await
    }

    /// Download this record's artifacts into a fresh local staging directory
    /// and return its path.
    pub async fn download(&self, record: &ModelRecord) -> Result<PathBuf> {
        let version_dir = record.version_dir()?;
        let version_name = version_dir
            .rsplit('/')
            .next()
            .expect("version dir always has segments")
            .to_string();

        let local_root = std::env::temp_dir().join(format!(
            "{}_{}",
            record.name,
            record.version.expect("checked by version_dir")
        ));
        if local_root.exists() {
            return Err(Error::AlreadyExists {
                path: local_root.display().to_string(),
            });
        }
        tokio::fs::create_dir_all(&local_root).await?;

        // the staging directory was created by this call, so on any failure
        // it is removed again; leaving it would poison every later retry
        // through the existence precondition above
        match self
            .fetch_and_unpack(&record.namespace(), &version_dir, &version_name, &local_root)
            .await
        {
            Ok(()) => {
                info!(model = %record.name, path = %local_root.display(), "model downloaded");
                Ok(local_root)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&local_root).await {
                    warn!(path = %local_root.display(), error = %cleanup, "failed to remove local staging directory");
                }
                Err(e)
            }
        }
    }

    async fn fetch_and_unpack(
        &self,
        namespace: &str,
        version_dir: &str,
        version_name: &str,
        local_root: &Path,
    ) -> Result<()> {
        let remote_tmp = format!("{namespace}/tmp_{}", Uuid::new_v4().simple());
        self.datasets.mkdir(&remote_tmp).await?;

        // server-side zip into the temporary directory, then stream it down
        let result = self
            .fetch_archive(version_dir, version_name, &remote_tmp, local_root)
            .await;
        // remote scratch is removed on success and failure alike
        if let Err(cleanup) = self.datasets.rm(&remote_tmp).await {
            warn!(path = %remote_tmp, error = %cleanup, "failed to remove remote scratch directory");
        }
        result?;

        let local_zip = local_root.join(format!("{version_name}.zip"));
        archive::unpack(&local_zip, local_root)?;
        tokio::fs::remove_file(&local_zip).await?;
        Ok(())
    }

    /// Delete a model version entirely: metadata record and artifacts.
    pub async fn delete(&self, record: &ModelRecord) -> Result<()> {
        let version_dir = record.version_dir()?;
        self.models.delete(&record.name).await?;
        self.datasets.rm(&version_dir).await?;
        info!(model = %record.name, path = %version_dir, "model deleted");
        Ok(())
    }

    /// Server-side zip of the version directory into the remote scratch
    /// directory, then stream the archive down next to the extraction root.
    async fn fetch_archive(
        &self,
        version_dir: &str,
        version_name: &str,
        remote_tmp: &str,
        local_root: &Path,
    ) -> Result<()> {
        archive_blocking(
            self.datasets,
            version_dir,
            Some(remote_tmp),
            ArchiveAction::Zip,
            ARCHIVE_TIMEOUT,
        )
        .await?;
        let remote_zip = format!("{remote_tmp}/{version_name}.zip");
        let local_zip = local_root.join(format!("{version_name}.zip"));
        self.datasets.download(&remote_zip, &local_zip).await?;
        Ok(())
    }

    async fn stage_side_artifacts(&self, record: &mut ModelRecord, version_dir: &str) -> Result<()> {
        if record.input_example.is_none() && record.signature.is_none() {
            return Ok(());
        }
        let scratch = tempfile::tempdir()?;
        if let Some(SideArtifact::Resolved(example)) = &record.input_example {
            let local = scratch.path().join("input_example.json");
            tokio::fs::write(&local, serde_json::to_vec(example)?).await?;
            self.datasets.upload(&local, version_dir).await?;
            record.input_example =
                Some(SideArtifact::Unresolved(format!("{version_dir}/input_example.json")));
        }
        if let Some(SideArtifact::Resolved(signature)) = &record.signature {
            let local = scratch.path().join("signature.json");
            tokio::fs::write(&local, serde_json::to_vec(signature)?).await?;
            self.datasets.upload(&local, version_dir).await?;
            record.signature =
                Some(SideArtifact::Unresolved(format!("{version_dir}/signature.json")));
        }
        Ok(())
    }

    /// Step 6: zip locally, upload, unzip remotely, relocate files.
    async fn transfer_artifacts(&self, artifact_dir: &Path, version_dir: &str) -> Result<()> {
        let staging = tempfile::tempdir()?;
        let archive_path = archive::pack_dir(artifact_dir, staging.path())?;
        let archive_name = archive_path
            .file_name()
            .expect("pack_dir returns a file path")
            .to_string_lossy()
            .into_owned();

        self.datasets.upload(&archive_path, version_dir).await?;

        let remote_zip = format!("{version_dir}/{archive_name}");
        archive_blocking(
            self.datasets,
            &remote_zip,
            None,
            ArchiveAction::Unzip,
            ARCHIVE_TIMEOUT,
        )
        .await?;
        self.datasets.rm(&remote_zip).await?;

        // the unzip materializes a staging subdirectory named after the
        // archive; relocate its top-level entries into the version directory
        let unpacked = remote_zip
            .strip_suffix(".zip")
            .expect("archive name carries the .zip suffix")
            .to_string();
        let entries = self
            .datasets
            .list(&unpacked, None, DEFAULT_LIST_LIMIT)
            .await?;
        for entry in &entries {
            let Some(name) = entry.base_name() else {
                continue;
            };
            self.move_with_retry(&format!("{unpacked}/{name}"), &format!("{version_dir}/{name}"))
                .await?;
        }
        self.datasets.rm(&unpacked).await?;
        Ok(())
    }

    /// Bounded retry around the relocation move, absorbing transient
    /// server-side rename races.
    async fn move_with_retry(&self, source: &str, destination: &str) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.datasets.mv(source, destination).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= MOVE_ATTEMPTS => return Err(e),
                Err(e) => {
                    warn!(source, destination, attempt, error = %e, "move failed, retrying");
                    tokio::time::sleep(MOVE_BACKOFF).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn await_registration(
        &self,
        record: &ModelRecord,
        budget: Duration,
    ) -> Result<Option<ModelRecord>> {
        let version = record.version.expect("set during save");
        let attempts = budget.as_secs().div_ceil(REGISTRATION_POLL_INTERVAL.as_secs()).max(1);
        for attempt in 0..attempts {
            match self.models.get(&record.name, version).await {
                Ok(confirmed) => return Ok(Some(confirmed)),
                Err(Error::NotFound { .. }) => {
                    if attempt + 1 < attempts {
                        tokio::time::sleep(REGISTRATION_POLL_INTERVAL).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        warn!(
            model = %record.name,
            version,
            budget_secs = budget.as_secs(),
            "registration not confirmed within budget"
        );
        Ok(None)
    }
}

/// Next version under a model namespace: one past the highest entry whose
/// base name parses as an integer. Gaps are ignored; nothing parseable means
/// version 1.
pub(crate) fn next_version(entries: &[DatasetStat]) -> u32 {
    entries
        .iter()
        .filter_map(|entry| entry.base_name())
        .filter_map(|name| name.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}
