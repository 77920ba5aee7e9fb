//! Toolchain Engine - lifecycle orchestration with compensation
//!
//! Drives the components of a toolchain through install, upgrade and
//! uninstall, persisting per-component progress in active state.
//!
//! ## Change batches
//!
//! Every install or upgrade pass mints a [`ChangeId`](toolchain_types::ChangeId)
//! and stamps it on each component it moves. When a pass fails, the
//! [`RollbackController`] rolls back exactly the components that pass
//! upgraded, under a change id of its own.
//!
//! ## Entry point
//!
//! [`ToolchainService`] validates a request, prepares the namespace and
//! spawns the pass in the background, returning as soon as setup is done.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod rollback;
pub mod service;
pub mod telemetry;

pub use config::{ChartsConfig, EngineConfig, LoggingConfig, StorageConfig, UninstallConfig};
pub use error::{EngineError, Result};
pub use orchestrator::Orchestrator;
pub use report::{BatchReport, RollbackHalt, RollbackReport, UninstallReport};
pub use rollback::RollbackController;
pub use service::ToolchainService;
pub use telemetry::init_tracing;
