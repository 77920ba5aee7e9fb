//! Toolchain State - desired and active state persistence
//!
//! Every toolchain owns exactly two records in its namespace:
//!
//! - **Desired state** (`ts-desired-state`): one opaque JSON document,
//!   replaced wholesale on every save.
//! - **Active state** (`ts-active-state`): a flat string map holding
//!   `<component>.status` and `<component>.cid` entries, created lazily on
//!   first write.
//!
//! The store does no locking. Callers keep to one writer per toolchain.

#![deny(unsafe_code)]

pub mod error;
pub mod store;

pub use error::{Result, StateError};
pub use store::{
    cid_key, status_key, StateStore, ACTIVE_STATE_RECORD, CONFIG_KEY, DESIRED_STATE_RECORD,
};
