//! Desired/active state store backed by namespaced cluster records.

use crate::error::{Result, StateError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use toolchain_types::{
    ChangeId, ClusterClient, ClusterError, ComponentStatus, RecordData, ToolchainId,
};
use tracing::debug;

/// Record holding the desired-state document.
pub const DESIRED_STATE_RECORD: &str = "ts-desired-state";
/// Record holding the active-state map.
pub const ACTIVE_STATE_RECORD: &str = "ts-active-state";
/// Key of the JSON document inside the desired-state record.
pub const CONFIG_KEY: &str = "config";

/// Active-state key of a component's status.
pub fn status_key(component: &str) -> String {
    format!("{component}.status")
}

/// Active-state key of the change batch that last moved a component.
pub fn cid_key(component: &str) -> String {
    format!("{component}.cid")
}

/// Persists one desired-state record and one active-state map per toolchain.
#[derive(Clone)]
pub struct StateStore {
    cluster: Arc<dyn ClusterClient>,
}

impl StateStore {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Serialize `config` and replace the stored desired state with it.
    pub async fn save_desired<T>(&self, toolchain: &ToolchainId, config: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let document = serde_json::to_string(config)?;
        self.upsert(
            toolchain,
            DESIRED_STATE_RECORD,
            RecordData::from([(CONFIG_KEY.to_string(), document)]),
        )
        .await?;
        debug!(toolchain = %toolchain, "Desired state saved");
        Ok(())
    }

    /// Load the stored desired state.
    ///
    /// Fails with [`StateError::NotFound`] when nothing was ever saved.
    pub async fn load_desired<T>(&self, toolchain: &ToolchainId) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let document = self
            .cluster
            .get_record(toolchain.namespace(), DESIRED_STATE_RECORD)
            .await?
            .and_then(|mut record| record.remove(CONFIG_KEY))
            .ok_or_else(|| StateError::NotFound {
                toolchain: toolchain.clone(),
                record: DESIRED_STATE_RECORD,
            })?;
        Ok(serde_json::from_str(&document)?)
    }

    /// Upsert one active-state entry, creating the record on first use.
    pub async fn set_active(&self, toolchain: &ToolchainId, key: &str, value: &str) -> Result<()> {
        self.upsert(
            toolchain,
            ACTIVE_STATE_RECORD,
            RecordData::from([(key.to_string(), value.to_string())]),
        )
        .await
    }

    /// Read one active-state entry.
    ///
    /// A missing record and a missing key both read as the empty string.
    pub async fn get_active(&self, toolchain: &ToolchainId, key: &str) -> Result<String> {
        Ok(self
            .cluster
            .get_record(toolchain.namespace(), ACTIVE_STATE_RECORD)
            .await?
            .and_then(|mut record| record.remove(key))
            .unwrap_or_default())
    }

    /// The whole active-state map, empty when the record does not exist.
    pub async fn active_snapshot(&self, toolchain: &ToolchainId) -> Result<RecordData> {
        Ok(self
            .cluster
            .get_record(toolchain.namespace(), ACTIVE_STATE_RECORD)
            .await?
            .unwrap_or_default())
    }

    pub async fn component_status(
        &self,
        toolchain: &ToolchainId,
        component: &str,
    ) -> Result<ComponentStatus> {
        let key = status_key(component);
        let value = self.get_active(toolchain, &key).await?;
        ComponentStatus::from_stored(&value).ok_or(StateError::InvalidStatus { key, value })
    }

    /// Change batch that last moved `component`; `None` if it never moved.
    pub async fn component_change_id(
        &self,
        toolchain: &ToolchainId,
        component: &str,
    ) -> Result<Option<ChangeId>> {
        let value = self.get_active(toolchain, &cid_key(component)).await?;
        Ok((!value.is_empty()).then(|| ChangeId::from_stored(value)))
    }

    /// Write a component's status and then its change id.
    ///
    /// Two separate writes: a failure between them leaves the new status
    /// paired with the previous change id.
    pub async fn record_transition(
        &self,
        toolchain: &ToolchainId,
        component: &str,
        status: ComponentStatus,
        change_id: &ChangeId,
    ) -> Result<()> {
        self.set_active(toolchain, &status_key(component), status.as_str())
            .await?;
        self.set_active(toolchain, &cid_key(component), change_id.as_str())
            .await?;
        debug!(
            toolchain = %toolchain,
            component = component,
            status = %status,
            change_id = %change_id,
            "Component transition recorded"
        );
        Ok(())
    }

    async fn upsert(&self, toolchain: &ToolchainId, record: &str, data: RecordData) -> Result<()> {
        let namespace = toolchain.namespace();
        match self
            .cluster
            .create_record(namespace, record, data.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(ClusterError::AlreadyExists { .. }) => {
                self.cluster.patch_record(namespace, record, data).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
