//! Durable records, secrets and batch jobs inside a cluster namespace
//!
//! The cluster is the only durable store the orchestrator has. Records are
//! flat string maps (config maps); secrets are the same shape but kept apart
//! so they never show up in state inspection. Jobs run one-off containers
//! such as database schema migrations.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use thiserror::Error;

/// Contents of a record or secret.
pub type RecordData = BTreeMap<String, String>;

/// Errors returned by the cluster API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found in namespace {namespace}")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} '{name}' already exists in namespace {namespace}")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("cluster api error: {0}")]
    Api(String),
}

/// Access to namespaced records and secrets.
///
/// Implementations must tolerate concurrent use; the same client is shared
/// by every teardown task of an uninstall.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a record. `Ok(None)` when it does not exist.
    async fn get_record(&self, namespace: &str, name: &str)
        -> Result<Option<RecordData>, ClusterError>;

    /// Create a record. Fails with [`ClusterError::AlreadyExists`] if present.
    async fn create_record(
        &self,
        namespace: &str,
        name: &str,
        data: RecordData,
    ) -> Result<(), ClusterError>;

    /// Merge `data` into an existing record, key by key.
    async fn patch_record(
        &self,
        namespace: &str,
        name: &str,
        data: RecordData,
    ) -> Result<(), ClusterError>;

    /// Fetch a secret. `Ok(None)` when it does not exist.
    async fn get_secret(&self, namespace: &str, name: &str)
        -> Result<Option<RecordData>, ClusterError>;

    /// Create a secret. Fails with [`ClusterError::AlreadyExists`] if present.
    async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        data: RecordData,
    ) -> Result<(), ClusterError>;

    /// Start a job. Fails with [`ClusterError::AlreadyExists`] while a job
    /// of the same name is still present.
    async fn create_job(&self, namespace: &str, job: &JobSpec) -> Result<(), ClusterError>;
}

/// A run-to-completion container, restarted on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: RecordData,
    /// Seconds a finished job is kept before the cluster deletes it.
    /// `None` keeps it until deleted explicitly.
    pub ttl_seconds_after_finished: Option<u32>,
}

type Key = (String, String);

/// In-memory cluster for development and testing.
///
/// Jobs complete as soon as they are created. A job with a zero TTL is
/// reaped right away; any other job stays until its namespace is purged.
#[derive(Default)]
pub struct InMemoryCluster {
    records: DashMap<Key, RecordData>,
    secrets: DashMap<Key, RecordData>,
    jobs: DashMap<Key, JobSpec>,
    job_runs: DashMap<String, Vec<JobSpec>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything stored in a namespace, as deleting it would.
    pub fn purge_namespace(&self, namespace: &str) {
        self.records.retain(|(ns, _), _| ns != namespace);
        self.secrets.retain(|(ns, _), _| ns != namespace);
        self.jobs.retain(|(ns, _), _| ns != namespace);
        self.job_runs.remove(namespace);
    }

    /// Number of records, secrets and retained jobs held for a namespace.
    pub fn object_count(&self, namespace: &str) -> usize {
        self.records.iter().filter(|e| e.key().0 == namespace).count()
            + self.secrets.iter().filter(|e| e.key().0 == namespace).count()
            + self.jobs.iter().filter(|e| e.key().0 == namespace).count()
    }

    /// Every job run in a namespace, oldest first.
    pub fn job_runs(&self, namespace: &str) -> Vec<JobSpec> {
        self.job_runs
            .get(namespace)
            .map(|runs| runs.clone())
            .unwrap_or_default()
    }

    fn key(namespace: &str, name: &str) -> Key {
        (namespace.to_string(), name.to_string())
    }

    fn create(
        map: &DashMap<Key, RecordData>,
        kind: &'static str,
        namespace: &str,
        name: &str,
        data: RecordData,
    ) -> Result<(), ClusterError> {
        match map.entry(Self::key(namespace, name)) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ClusterError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(data);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get_record(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RecordData>, ClusterError> {
        Ok(self
            .records
            .get(&Self::key(namespace, name))
            .map(|r| r.clone()))
    }

    async fn create_record(
        &self,
        namespace: &str,
        name: &str,
        data: RecordData,
    ) -> Result<(), ClusterError> {
        Self::create(&self.records, "record", namespace, name, data)
    }

    async fn patch_record(
        &self,
        namespace: &str,
        name: &str,
        data: RecordData,
    ) -> Result<(), ClusterError> {
        match self.records.get_mut(&Self::key(namespace, name)) {
            Some(mut record) => {
                record.extend(data);
                Ok(())
            }
            None => Err(ClusterError::NotFound {
                kind: "record",
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RecordData>, ClusterError> {
        Ok(self
            .secrets
            .get(&Self::key(namespace, name))
            .map(|s| s.clone()))
    }

    async fn create_secret(
        &self,
        namespace: &str,
        name: &str,
        data: RecordData,
    ) -> Result<(), ClusterError> {
        Self::create(&self.secrets, "secret", namespace, name, data)
    }

    async fn create_job(&self, namespace: &str, job: &JobSpec) -> Result<(), ClusterError> {
        let key = Self::key(namespace, &job.name);
        if self.jobs.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: "job",
                namespace: namespace.to_string(),
                name: job.name.clone(),
            });
        }
        if job.ttl_seconds_after_finished != Some(0) {
            self.jobs.insert(key, job.clone());
        }
        self.job_runs
            .entry(namespace.to_string())
            .or_default()
            .push(job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> RecordData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_then_patch_merges() {
        let cluster = InMemoryCluster::new();
        cluster
            .create_record("ns", "rec", data(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();
        cluster
            .patch_record("ns", "rec", data(&[("b", "3"), ("c", "4")]))
            .await
            .unwrap();

        let record = cluster.get_record("ns", "rec").await.unwrap().unwrap();
        assert_eq!(record, data(&[("a", "1"), ("b", "3"), ("c", "4")]));
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let cluster = InMemoryCluster::new();
        cluster.create_secret("ns", "s", data(&[])).await.unwrap();
        let err = cluster.create_secret("ns", "s", data(&[])).await.unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists { kind: "secret", .. }));
    }

    #[tokio::test]
    async fn test_patch_missing_record() {
        let cluster = InMemoryCluster::new();
        let err = cluster.patch_record("ns", "rec", data(&[])).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_purge_namespace() {
        let cluster = InMemoryCluster::new();
        cluster.create_record("a", "r", data(&[])).await.unwrap();
        cluster.create_secret("a", "s", data(&[])).await.unwrap();
        cluster.create_record("b", "r", data(&[])).await.unwrap();

        cluster.purge_namespace("a");

        assert_eq!(cluster.object_count("a"), 0);
        assert_eq!(cluster.object_count("b"), 1);
        assert!(cluster.get_record("a", "r").await.unwrap().is_none());
    }

    fn job(name: &str, ttl: Option<u32>) -> JobSpec {
        JobSpec {
            name: name.into(),
            image: "busybox".into(),
            ttl_seconds_after_finished: ttl,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reaped_job_can_run_again() {
        let cluster = InMemoryCluster::new();
        cluster.create_job("ns", &job("migrate", Some(0))).await.unwrap();
        cluster.create_job("ns", &job("migrate", Some(0))).await.unwrap();

        assert_eq!(cluster.job_runs("ns").len(), 2);
        assert_eq!(cluster.object_count("ns"), 0);
    }

    #[tokio::test]
    async fn test_retained_job_blocks_same_name() {
        let cluster = InMemoryCluster::new();
        cluster.create_job("ns", &job("migrate", None)).await.unwrap();

        let err = cluster
            .create_job("ns", &job("migrate", Some(0)))
            .await
            .unwrap_err();

        assert!(matches!(err, ClusterError::AlreadyExists { kind: "job", .. }));
        assert_eq!(cluster.job_runs("ns").len(), 1);

        cluster.purge_namespace("ns");
        assert!(cluster.job_runs("ns").is_empty());
        cluster.create_job("ns", &job("migrate", None)).await.unwrap();
    }
}
