//! Toolchain Types - core types for component lifecycle orchestration
//!
//! A toolchain is a fixed, ordered set of independently deployable
//! components that share one cluster namespace. This crate holds the
//! vocabulary every other toolchain crate speaks.
//!
//! ## Key Concepts
//!
//! - **ToolchainId**: the namespace that owns a toolchain's components and state
//! - **ChangeId**: the identifier minted for every install, upgrade or rollback pass
//! - **ComponentStatus**: the per-component lifecycle marker kept in active state
//! - **DesiredConfig**: the target configuration a toolchain converges to
//! - **ClusterClient**: the durable record, secret and job api of a namespace

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cluster;
pub mod desired;
pub mod error;
pub mod ids;
pub mod profile;
pub mod status;

pub use cluster::{ClusterClient, ClusterError, InMemoryCluster, JobSpec, RecordData};
pub use desired::{DesiredConfig, ToolchainKind};
pub use error::ValidationError;
pub use ids::{ChangeId, ToolchainId};
pub use profile::Profile;
pub use status::ComponentStatus;
