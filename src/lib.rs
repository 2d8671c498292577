//! Client library for a remote model registry.
//!
//! Data scientists use it to save trained model artifacts under a
//! `Models/{name}/{version}` layout on the backend's dataset service and to
//! retrieve them later by name and version. The library is a set of HTTP
//! facades (dataset filesystem, model registry) plus an orchestration engine
//! that sequences version allocation, metadata registration, chunked archive
//! transfer, server-side unpacking and relocation.
//!
//! All I/O is strictly sequential: one chunk in flight per upload, fixed
//! interval polling for the asynchronous server-side archive actions, no
//! internal parallelism. Diagnostics go through `tracing`.
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use modelhub::{ClientConfig, Framework, ModelRegistry, Session};
//!
//! # async fn run() -> modelhub::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let session = Session::new(&config)?;
//! let registry = ModelRegistry::new(session, config.provenance());
//!
//! let mut record = registry.create_model("mnist", Framework::Tensorflow);
//! record.description = Some("digit classifier".into());
//! registry
//!     .save_model(&mut record, Path::new("./model_out"), Duration::ZERO)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod client;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod signature;
pub mod transfer;

pub use client::Session;
pub use config::{ClientConfig, Provenance};
pub use dataset::{ArchiveAction, DatasetApi, DatasetStat, DatasetStore};
pub use engine::Engine;
pub use error::{Error, Result};
pub use model::{Framework, ModelRecord, SideArtifact};
pub use registry::{ModelRegistry, ModelStore, ModelsApi};
pub use signature::{Column, Signature, SignatureSpec, TensorSpec};
