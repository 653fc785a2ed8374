use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use synthflow_utils::error::ConfigError;
use synthflow_utils::types::GatewayCall;

use super::{
    CliArgs, Config, ConfigSource, GatewayConfig, PipelineConfig, ServerConfig, StorageBackend,
    StorageConfig,
};

/// File name searched for in the start directory.
pub const CONFIG_FILE_NAME: &str = "synthflow.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SYNTHFLOW_CONFIG";

/// TOML configuration file structure.
///
/// Every field is optional so that source attribution only credits the
/// file for keys it actually sets.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    server: Option<TomlServer>,
    storage: Option<TomlStorage>,
    gateway: Option<TomlGateway>,
    pipeline: Option<TomlPipeline>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlServer {
    bind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlStorage {
    backend: Option<StorageBackend>,
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGateway {
    endpoints: Option<BTreeMap<String, String>>,
    timeouts: Option<TomlTimeouts>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTimeouts {
    stage1: Option<u64>,
    stage2: Option<u64>,
    stage3: Option<u64>,
    stage4: Option<u64>,
    stage5: Option<u64>,
    stage6: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPipeline {
    min_input_words: Option<usize>,
    max_outcome_words: Option<usize>,
    paper_chunk_size: Option<usize>,
    repository_first_chunk: Option<usize>,
    repository_chunk_size: Option<usize>,
}

/// Overwrite `slot` with `value` when present and credit `source` for `key`.
fn apply<T>(
    slot: &mut T,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(v) = value {
        *slot = v;
        attribution.insert(key.to_string(), source.clone());
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > env > file > defaults
    ///
    /// Reads the process environment and searches the current directory.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args, |key| std::env::var(key).ok())
    }

    /// Discover configuration from an explicit directory and environment.
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state; `env` stands in for `std::env::var`.
    pub fn discover_from<F>(start_dir: &Path, cli_args: &CliArgs, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut attribution = HashMap::new();
        let mut server = ServerConfig::default();
        let mut storage = StorageConfig::default();
        let mut gateway = GatewayConfig::default();
        let mut pipeline = PipelineConfig::default();

        for key in [
            "server.bind",
            "storage.backend",
            "storage.data_dir",
            "pipeline.min_input_words",
            "pipeline.max_outcome_words",
        ] {
            attribution.insert(key.to_string(), ConfigSource::Default);
        }

        // File layer
        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => match env(CONFIG_ENV_VAR) {
                Some(from_env) => Some(PathBuf::from(from_env)),
                None => Self::discover_config_file_from(start_dir),
            },
        };

        if let Some(path) = &config_path {
            let file = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let src = ConfigSource::Config;

            if let Some(s) = file.server {
                apply(&mut server.bind, s.bind, "server.bind", &src, &mut attribution);
            }
            if let Some(s) = file.storage {
                apply(&mut storage.backend, s.backend, "storage.backend", &src, &mut attribution);
                apply(&mut storage.data_dir, s.data_dir, "storage.data_dir", &src, &mut attribution);
            }
            if let Some(g) = file.gateway {
                if let Some(endpoints) = g.endpoints {
                    for (key, url) in endpoints {
                        attribution.insert(format!("gateway.endpoints.{key}"), src.clone());
                        gateway.endpoints.insert(key, url);
                    }
                }
                if let Some(t) = g.timeouts {
                    let timeouts = &mut gateway.timeouts;
                    apply(&mut timeouts.stage1, t.stage1, "gateway.timeouts.stage1", &src, &mut attribution);
                    apply(&mut timeouts.stage2, t.stage2, "gateway.timeouts.stage2", &src, &mut attribution);
                    apply(&mut timeouts.stage3, t.stage3, "gateway.timeouts.stage3", &src, &mut attribution);
                    apply(&mut timeouts.stage4, t.stage4, "gateway.timeouts.stage4", &src, &mut attribution);
                    apply(&mut timeouts.stage5, t.stage5, "gateway.timeouts.stage5", &src, &mut attribution);
                    apply(&mut timeouts.stage6, t.stage6, "gateway.timeouts.stage6", &src, &mut attribution);
                }
                if g.connect_timeout_secs.is_some() {
                    gateway.connect_timeout_secs = g.connect_timeout_secs;
                    attribution.insert("gateway.connect_timeout_secs".to_string(), src.clone());
                }
            }
            if let Some(p) = file.pipeline {
                apply(&mut pipeline.min_input_words, p.min_input_words, "pipeline.min_input_words", &src, &mut attribution);
                apply(&mut pipeline.max_outcome_words, p.max_outcome_words, "pipeline.max_outcome_words", &src, &mut attribution);
                apply(&mut pipeline.paper_chunk_size, p.paper_chunk_size, "pipeline.paper_chunk_size", &src, &mut attribution);
                apply(&mut pipeline.repository_first_chunk, p.repository_first_chunk, "pipeline.repository_first_chunk", &src, &mut attribution);
                apply(&mut pipeline.repository_chunk_size, p.repository_chunk_size, "pipeline.repository_chunk_size", &src, &mut attribution);
            }
        }

        // Environment layer
        let src = ConfigSource::Env;
        for call in GatewayCall::ALL {
            if let Some(url) = env(&call.env_var()).filter(|u| !u.trim().is_empty()) {
                attribution.insert(format!("gateway.endpoints.{}", call.config_key()), src.clone());
                gateway.endpoints.insert(call.config_key().to_string(), url);
            }
        }
        apply(&mut server.bind, env("SYNTHFLOW_BIND"), "server.bind", &src, &mut attribution);
        apply(
            &mut storage.data_dir,
            env("SYNTHFLOW_DATA_DIR").map(PathBuf::from),
            "storage.data_dir",
            &src,
            &mut attribution,
        );
        if let Some(raw) = env("SYNTHFLOW_STORAGE") {
            let backend = raw.parse::<StorageBackend>().map_err(|value| ConfigError::InvalidValue {
                key: "storage.backend".to_string(),
                value,
            })?;
            apply(&mut storage.backend, Some(backend), "storage.backend", &src, &mut attribution);
        }

        // CLI layer
        let src = ConfigSource::Cli;
        apply(&mut server.bind, cli_args.bind.clone(), "server.bind", &src, &mut attribution);
        apply(&mut storage.data_dir, cli_args.data_dir.clone(), "storage.data_dir", &src, &mut attribution);
        if let Some(raw) = &cli_args.storage {
            let backend = raw.parse::<StorageBackend>().map_err(|value| ConfigError::InvalidValue {
                key: "storage.backend".to_string(),
                value,
            })?;
            apply(&mut storage.backend, Some(backend), "storage.backend", &src, &mut attribution);
        }

        let config = Config {
            server,
            storage,
            gateway,
            pipeline,
            source_attribution: attribution,
        };
        config.validate()?;
        Ok(config)
    }

    /// Look for `synthflow.toml` in `start_dir`.
    fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let candidate = start_dir.join(CONFIG_FILE_NAME);
        candidate.is_file().then_some(candidate)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let parsed: TomlConfig =
            toml::from_str(&content).map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        Ok(parsed)
    }
}
