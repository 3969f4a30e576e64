//! `monoupdate` detects stale container images and applies updates to the containers running them.
//!
//! # Overview
//!
//! monoupdate compares every locally pulled image with what its registry currently serves for the
//! same tag, finds containers still running an image their tag has since moved away from, and
//! rolls updates out by pulling the new image and recreating the affected containers. It handles:
//! - Registry endpoint and token resolution for Docker Hub, GHCR, Quay and private registries
//! - Multi-arch manifest lists and platform selection
//! - Version metadata from image labels and GitHub releases
//! - Grouped recreation of compose applications
//! - Scheduled, notify-only or automatic updates
//!
//! # Architecture
//!
//! - **OCI**: Registry protocol, manifests, digests and version metadata
//! - **Runtime**: Container runtime and stack orchestrator seams, with Docker implementations
//! - **Update**: Scanning, execution, scheduling and history
//! - **Management**: Persistence of schedules and history
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use monoupdate::{
//!     config::EngineConfig,
//!     management::SqliteConfigStore,
//!     runtime::{ComposeCli, ContainerRuntime, DockerRuntime},
//!     EngineServices, UpdateEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
//!     let services = EngineServices::builder()
//!         .runtime(runtime.clone())
//!         .orchestrator(Arc::new(ComposeCli::new(runtime)))
//!         .store(Arc::new(SqliteConfigStore::open("/path/to/monoupdate.db").await?))
//!         .build();
//!
//!     let engine = UpdateEngine::new(EngineConfig::default(), services).await?;
//!     for candidate in engine.scan().await? {
//!         println!("{} {} -> {}", candidate.key(), candidate.get_current_digest(), candidate.get_latest_digest());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Engine configuration and schedules
//! - [`management`] - Schedule and history persistence
//! - [`oci`] - OCI registry protocol and image metadata
//! - [`runtime`] - Container runtime and orchestrator seams
//! - [`update`] - Scanning, execution and scheduling
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod engine;
mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod management;
pub mod oci;
pub mod runtime;
pub mod update;
pub mod utils;

pub use engine::*;
pub use error::*;
