use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use synthflow_utils::types::ConfigSource;

/// Default listen address for the control API.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default directory for file-backed session storage.
pub const DEFAULT_DATA_DIR: &str = ".synthflow/sessions";

/// Default connect timeout for outbound gateway calls, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Minimum words in a problem statement.
pub const DEFAULT_MIN_INPUT_WORDS: usize = 30;

/// Maximum words in an expected outcome.
pub const DEFAULT_MAX_OUTCOME_WORDS: usize = 200;

/// Configuration for synthflow.
///
/// `Config` is assembled by [`Config::discover()`] for CLI use, or by
/// [`Config::builder()`] when embedding the engine.
///
/// Every effective value records its origin in `source_attribution`, keyed
/// by a dotted name such as `gateway.timeouts.stage3`.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
    pub pipeline: PipelineConfig,
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[server]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Where sessions are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per session under `data_dir`.
    #[default]
    File,
    /// Process memory only; lost on restart.
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{other}' (expected file or memory)")),
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// `[gateway]` section
///
/// ```toml
/// [gateway]
/// connect_timeout_secs = 30
///
/// [gateway.endpoints]
/// stage1 = "https://hooks.example.com/webhook/refine"
/// stage2_papers = "https://hooks.example.com/webhook/papers"
///
/// [gateway.timeouts]
/// stage3 = 1800
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Endpoint URLs keyed by `GatewayCall::config_key()`.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub timeouts: StageTimeouts,
    pub connect_timeout_secs: Option<u64>,
}

/// Per-stage call timeouts in seconds.
///
/// Light stages default to a few minutes; the chunked analysis stage
/// defaults to twenty.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StageTimeouts {
    #[serde(default = "default_stage1_timeout")]
    pub stage1: u64,
    #[serde(default = "default_stage2_timeout")]
    pub stage2: u64,
    #[serde(default = "default_stage3_timeout")]
    pub stage3: u64,
    #[serde(default = "default_stage4_timeout")]
    pub stage4: u64,
    #[serde(default = "default_stage5_timeout")]
    pub stage5: u64,
    #[serde(default = "default_stage6_timeout")]
    pub stage6: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            stage1: default_stage1_timeout(),
            stage2: default_stage2_timeout(),
            stage3: default_stage3_timeout(),
            stage4: default_stage4_timeout(),
            stage5: default_stage5_timeout(),
            stage6: default_stage6_timeout(),
        }
    }
}

fn default_stage1_timeout() -> u64 {
    150
}
fn default_stage2_timeout() -> u64 {
    180
}
fn default_stage3_timeout() -> u64 {
    1200
}
fn default_stage4_timeout() -> u64 {
    180
}
fn default_stage5_timeout() -> u64 {
    180
}
fn default_stage6_timeout() -> u64 {
    300
}

/// `[pipeline]` section
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PipelineConfig {
    #[serde(default = "default_min_input_words")]
    pub min_input_words: usize,
    #[serde(default = "default_max_outcome_words")]
    pub max_outcome_words: usize,
    /// Papers per analysis chunk.
    #[serde(default = "default_paper_chunk_size")]
    pub paper_chunk_size: usize,
    /// Repositories in the first analysis chunk.
    #[serde(default = "default_repository_first_chunk")]
    pub repository_first_chunk: usize,
    /// Repositories in every later analysis chunk.
    #[serde(default = "default_repository_chunk_size")]
    pub repository_chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_input_words: default_min_input_words(),
            max_outcome_words: default_max_outcome_words(),
            paper_chunk_size: default_paper_chunk_size(),
            repository_first_chunk: default_repository_first_chunk(),
            repository_chunk_size: default_repository_chunk_size(),
        }
    }
}

fn default_min_input_words() -> usize {
    DEFAULT_MIN_INPUT_WORDS
}
fn default_max_outcome_words() -> usize {
    DEFAULT_MAX_OUTCOME_WORDS
}
fn default_paper_chunk_size() -> usize {
    3
}
fn default_repository_first_chunk() -> usize {
    4
}
fn default_repository_chunk_size() -> usize {
    3
}
