use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use synthflow_utils::error::ConfigError;
use synthflow_utils::types::{GatewayCall, StageId};

use super::{
    Config, ConfigSource, GatewayConfig, PipelineConfig, ServerConfig, StorageBackend,
    StorageConfig,
};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when embedding the engine and the process environment or a
    /// config file should not influence behavior.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use synthflow_config::Config;
    /// use synthflow_utils::types::GatewayCall;
    ///
    /// let config = Config::builder()
    ///     .bind("127.0.0.1:9090")
    ///     .endpoint(GatewayCall::Refine, "http://localhost:5678/webhook/refine")
    ///     .memory_storage()
    ///     .build()
    ///     .expect("Failed to build config");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration.
///
/// All values set via the builder are attributed to
/// `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    bind: Option<String>,
    backend: Option<StorageBackend>,
    data_dir: Option<PathBuf>,
    endpoints: Vec<(GatewayCall, String)>,
    timeouts: Vec<(StageId, Duration)>,
    min_input_words: Option<usize>,
    max_outcome_words: Option<usize>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen address for the control API.
    #[must_use]
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind = Some(addr.into());
        self
    }

    /// Persist sessions as JSON files under `dir`.
    #[must_use]
    pub fn file_storage(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backend = Some(StorageBackend::File);
        self.data_dir = Some(dir.into());
        self
    }

    /// Keep sessions in memory only.
    #[must_use]
    pub fn memory_storage(mut self) -> Self {
        self.backend = Some(StorageBackend::Memory);
        self
    }

    #[must_use]
    pub fn endpoint(mut self, call: GatewayCall, url: impl Into<String>) -> Self {
        self.endpoints.push((call, url.into()));
        self
    }

    /// Timeout for every call of `stage`. Truncated to whole seconds.
    #[must_use]
    pub fn stage_timeout(mut self, stage: StageId, timeout: Duration) -> Self {
        self.timeouts.push((stage, timeout));
        self
    }

    #[must_use]
    pub fn min_input_words(mut self, words: usize) -> Self {
        self.min_input_words = Some(words);
        self
    }

    #[must_use]
    pub fn max_outcome_words(mut self, words: usize) -> Self {
        self.max_outcome_words = Some(words);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut attribution = HashMap::new();
        let src = ConfigSource::Programmatic;

        let mut server = ServerConfig::default();
        if let Some(bind) = self.bind {
            server.bind = bind;
            attribution.insert("server.bind".to_string(), src.clone());
        }

        let mut storage = StorageConfig::default();
        if let Some(backend) = self.backend {
            storage.backend = backend;
            attribution.insert("storage.backend".to_string(), src.clone());
        }
        if let Some(dir) = self.data_dir {
            storage.data_dir = dir;
            attribution.insert("storage.data_dir".to_string(), src.clone());
        }

        let mut gateway = GatewayConfig::default();
        for (call, url) in self.endpoints {
            attribution.insert(format!("gateway.endpoints.{}", call.config_key()), src.clone());
            gateway.endpoints.insert(call.config_key().to_string(), url);
        }
        for (stage, timeout) in self.timeouts {
            let secs = timeout.as_secs();
            let t = &mut gateway.timeouts;
            match stage {
                StageId::Refine => t.stage1 = secs,
                StageId::Retrieval => t.stage2 = secs,
                StageId::Analysis => t.stage3 = secs,
                StageId::GapFinder => t.stage4 = secs,
                StageId::Synthesis => t.stage5 = secs,
                StageId::Solution => t.stage6 = secs,
            }
            attribution.insert(
                format!("gateway.timeouts.stage{}", stage.number()),
                src.clone(),
            );
        }

        let mut pipeline = PipelineConfig::default();
        if let Some(words) = self.min_input_words {
            pipeline.min_input_words = words;
            attribution.insert("pipeline.min_input_words".to_string(), src.clone());
        }
        if let Some(words) = self.max_outcome_words {
            pipeline.max_outcome_words = words;
            attribution.insert("pipeline.max_outcome_words".to_string(), src);
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
}
