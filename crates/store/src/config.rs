use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "GOVSYNC_HOME";
pub const FETCH_CONCURRENCY_ENV: &str = "GOVSYNC_FETCH_CONCURRENCY";

pub const MAX_FETCH_CONCURRENCY: usize = 10;
const DEFAULT_FETCH_CONCURRENCY: usize = 4;
const DEFAULT_MAX_CHUNKS: usize = 4_096;
const DEFAULT_PAGE_SIZE: u64 = 1_000;
const DEFAULT_TAXONOMY_AREA: &str = "RiggedEconomy";

/// Everything the stores need to know about where state lives and how hard to hit the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of all local state (chunk scratch, document caches, rollup indexes).
    pub home: PathBuf,
    /// Parallel document fetches for different roots.
    pub fetch_concurrency: usize,
    /// Longest chunk chain accepted before the document is declared corrupt.
    pub max_chunks: usize,
    /// Indices requested per cursor page.
    pub page_size: u64,
    /// Hierarchy area whose latest taxonomy drives topic ranking.
    pub taxonomy_area: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".govsync"),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            max_chunks: DEFAULT_MAX_CHUNKS,
            page_size: DEFAULT_PAGE_SIZE,
            taxonomy_area: DEFAULT_TAXONOMY_AREA.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Load a TOML config file; missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw).map_err(|err| {
            StoreError::InvalidConfig(format!("{}: {err}", path.display()))
        })?;
        config.validated()
    }

    /// Apply `GOVSYNC_HOME` / `GOVSYNC_FETCH_CONCURRENCY` on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            self.home = PathBuf::from(home);
        }
        let raw = std::env::var(FETCH_CONCURRENCY_ENV).ok();
        self.fetch_concurrency = parse_fetch_concurrency(raw.as_deref(), self.fetch_concurrency);
        self
    }

    pub fn validated(mut self) -> Result<Self> {
        if self.max_chunks == 0 {
            return Err(StoreError::InvalidConfig("max_chunks must be > 0".into()));
        }
        if self.taxonomy_area.trim().is_empty() {
            return Err(StoreError::InvalidConfig("taxonomy_area is empty".into()));
        }
        self.fetch_concurrency = self.fetch_concurrency.clamp(1, MAX_FETCH_CONCURRENCY);
        self.page_size = self.page_size.max(1);
        Ok(self)
    }

    #[must_use]
    pub fn chunk_scratch_dir(&self) -> PathBuf {
        self.home.join("chunks").join("scratch")
    }

    #[must_use]
    pub fn chunk_document_dir(&self) -> PathBuf {
        self.home.join("chunks").join("documents")
    }

    #[must_use]
    pub fn document_cache_dir(&self) -> PathBuf {
        self.home.join("documents")
    }

    #[must_use]
    pub fn rollup_dir(&self) -> PathBuf {
        self.home.join("rollups")
    }
}

fn parse_fetch_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_FETCH_CONCURRENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_fetch_concurrency_defaults_and_clamps() {
        assert_eq!(parse_fetch_concurrency(None, 4), 4);
        assert_eq!(parse_fetch_concurrency(Some("  "), 4), 4);
        assert_eq!(parse_fetch_concurrency(Some("abc"), 4), 4);
        assert_eq!(parse_fetch_concurrency(Some("0"), 4), 1);
        assert_eq!(parse_fetch_concurrency(Some(" 7 "), 4), 7);
        assert_eq!(parse_fetch_concurrency(Some("500"), 4), MAX_FETCH_CONCURRENCY);
    }

    #[test]
    fn toml_file_keeps_defaults_for_missing_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("govsync.toml");
        std::fs::write(&path, "home = \"/var/lib/govsync\"\nfetch_concurrency = 99\n").unwrap();

        let config = SyncConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.home, PathBuf::from("/var/lib/govsync"));
        assert_eq!(config.fetch_concurrency, MAX_FETCH_CONCURRENCY);
        assert_eq!(config.max_chunks, DEFAULT_MAX_CHUNKS);
        assert_eq!(config.rollup_dir(), PathBuf::from("/var/lib/govsync/rollups"));
    }

    #[test]
    fn zero_max_chunks_is_rejected() {
        let config = SyncConfig {
            max_chunks: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(
            config.validated(),
            Err(StoreError::InvalidConfig(_))
        ));
    }
}
