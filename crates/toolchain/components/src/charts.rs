//! Chart archive lookup and release naming

use crate::dispatcher::ChartRelease;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;

/// A pinned chart archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSource {
    pub name: &'static str,
    pub version: &'static str,
}

impl ChartSource {
    pub const fn new(name: &'static str, version: &'static str) -> Self {
        Self { name, version }
    }

    pub fn archive_name(&self) -> String {
        format!("{}-{}.tgz", self.name, self.version)
    }
}

/// Where chart archives live and how long a release may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartCatalog {
    dir: PathBuf,
    timeout: Duration,
}

impl ChartCatalog {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn archive_path(&self, source: &ChartSource) -> String {
        self.dir
            .join(source.archive_name())
            .to_string_lossy()
            .into_owned()
    }

    /// Release request for `source`, named after the chart.
    pub fn release(&self, source: &ChartSource) -> ChartRelease {
        ChartRelease::new(source.name, self.archive_path(source), self.timeout)
    }
}

impl Default for ChartCatalog {
    fn default() -> Self {
        Self::new("charts", Duration::from_secs(300))
    }
}

/// Short stable id derived from a namespace, used to suffix in-cluster service names.
pub fn unique_id(namespace: &str) -> String {
    let digest = Sha256::digest(namespace.as_bytes());
    digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()[..7]
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_for_source() {
        let catalog = ChartCatalog::new("/opt/charts", Duration::from_secs(60));
        let release = catalog.release(&ChartSource::new("loki", "3.6.1"));
        assert_eq!(release.name, "loki");
        assert_eq!(release.chart_path, "/opt/charts/loki-3.6.1.tgz");
        assert_eq!(release.timeout, Duration::from_secs(60));
        assert!(release.values.is_none());
    }

    #[test]
    fn test_unique_id_is_stable_and_short() {
        let a = unique_id("ts-toolchain-dev");
        assert_eq!(a.len(), 7);
        assert_eq!(a, unique_id("ts-toolchain-dev"));
        assert_ne!(a, unique_id("ts-toolchain-prod"));
    }
}
