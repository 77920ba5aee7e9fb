//! Toolchain Components - the uniform component contract
//!
//! Every deployable piece of a toolchain implements [`Component`]
//! (install, upgrade, rollback, uninstall) against a [`Dispatcher`], the
//! capability that performs the actual namespace, chart and in-target
//! command operations. The orchestrator only ever sees these two traits.
//!
//! ## Architectural Boundaries
//!
//! - `toolchain-components` owns: the component contract, the ordered
//!   registry, and the standard adapters
//! - `toolchain-engine` owns: ordering, state tracking and compensation
//! - The dispatcher implementation (chart tooling, cluster API) lives
//!   outside this workspace and is consumed through [`Dispatcher`]

#![deny(unsafe_code)]

pub mod charts;
pub mod component;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod registry;
pub mod secrets;
pub mod standard;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use charts::{ChartCatalog, ChartSource};
pub use component::{Component, LifecycleOp};
pub use dispatcher::{ChartRelease, Dispatcher, DispatcherFactory};
pub use error::{ComponentError, DispatchError, RegistryError, Result};
pub use identity::{AuthentikIdentityProvider, IdentityProvider, OidcClient};
pub use registry::{ComponentRegistry, RegisteredComponent};
