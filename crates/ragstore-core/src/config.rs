//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_INDEX__N_LIST=64`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{ScoreMode, Topology};

pub const DEFAULT_NLIST: usize = 100;
pub const DEFAULT_PQ_M: usize = 64;
pub const DEFAULT_PQ_NBITS: usize = 8;
pub const DEFAULT_BATCH_SIZE: usize = 32;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Wrap an already assembled figment (tests, embedding applications).
    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the typed settings.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the three store artifacts.
    pub store_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self { Self { store_dir: "./data/store".to_string() } }
}

impl DataConfig {
    pub fn store_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.store_dir) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub topology: Topology,
    pub n_list: usize,
    /// Cells probed per IVF query; derived from `n_list` when unset.
    pub n_probe: Option<usize>,
    pub pq_m: usize,
    pub pq_nbits: usize,
    pub train_iterations: usize,
    pub seed: u64,
    /// Train an untrained IVF index on the first ingested batch.
    pub auto_train: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            topology: Topology::FlatL2,
            n_list: DEFAULT_NLIST,
            n_probe: None,
            pq_m: DEFAULT_PQ_M,
            pq_nbits: DEFAULT_PQ_NBITS,
            train_iterations: 20,
            seed: 1234,
            auto_train: true,
        }
    }
}

impl IndexConfig {
    pub fn effective_n_probe(&self) -> usize {
        self.n_probe.unwrap_or_else(|| default_n_probe(self.n_list))
    }
}

/// `min(10, n_list / 10)`, floored at one cell.
pub fn default_n_probe(n_list: usize) -> usize { (n_list / 10).clamp(1, 10) }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_ms: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { provider: "hashing".to_string(), dimension: 384, batch_size: DEFAULT_BATCH_SIZE, timeout_ms: None }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Option<Duration> { self.timeout_ms.map(Duration::from_millis) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub score_mode: ScoreMode,
    pub min_score: f32,
}

impl Default for SearchConfig {
    fn default() -> Self { Self { default_k: 5, max_k: 100, score_mode: ScoreMode::Reciprocal, min_score: 0.0 } }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be at least 1".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be at least 1".into()));
        }
        if self.index.n_list == 0 {
            return Err(Error::InvalidConfig("index.n_list must be at least 1".into()));
        }
        if self.index.n_probe == Some(0) {
            return Err(Error::InvalidConfig("index.n_probe must be at least 1".into()));
        }
        if !(1..=8).contains(&self.index.pq_nbits) {
            return Err(Error::InvalidConfig(format!("index.pq_nbits must be in 1..=8, got {}", self.index.pq_nbits)));
        }
        if self.index.pq_m == 0 {
            return Err(Error::InvalidConfig("index.pq_m must be at least 1".into()));
        }
        if self.search.default_k == 0 || self.search.default_k > self.search.max_k {
            return Err(Error::InvalidConfig(format!(
                "search.default_k must be in 1..={}, got {}",
                self.search.max_k, self.search.default_k
            )));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
