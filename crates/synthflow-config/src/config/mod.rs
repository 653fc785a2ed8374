//! Configuration management for synthflow
//!
//! Precedence: CLI > environment > file > defaults.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use model::*;
pub use synthflow_utils::types::ConfigSource;

use std::net::SocketAddr;
use std::time::Duration;

use synthflow_utils::error::ConfigError;
use synthflow_utils::types::{GatewayCall, StageId};

impl Config {
    /// Endpoint URL configured for a gateway call, if any.
    #[must_use]
    pub fn endpoint_for(&self, call: GatewayCall) -> Option<&str> {
        self.gateway
            .endpoints
            .get(call.config_key())
            .map(String::as_str)
            .filter(|url| !url.trim().is_empty())
    }

    /// Call timeout for every gateway call belonging to `stage`.
    #[must_use]
    pub fn timeout_for(&self, stage: StageId) -> Duration {
        let t = &self.gateway.timeouts;
        let secs = match stage {
            StageId::Refine => t.stage1,
            StageId::Retrieval => t.stage2,
            StageId::Analysis => t.stage3,
            StageId::GapFinder => t.stage4,
            StageId::Synthesis => t.stage5,
            StageId::Solution => t.stage6,
        };
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.gateway
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Parse the configured listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "server.bind".to_string(),
                value: format!("'{}': {e}", self.server.bind),
            })
    }

    /// Gateway calls that have no endpoint configured.
    #[must_use]
    pub fn missing_endpoints(&self) -> Vec<GatewayCall> {
        GatewayCall::ALL
            .into_iter()
            .filter(|call| self.endpoint_for(*call).is_none())
            .collect()
    }

    /// Config with built-in defaults only, for unit tests.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                data_dir: std::path::PathBuf::from(DEFAULT_DATA_DIR),
            },
            gateway: GatewayConfig::default(),
            pipeline: PipelineConfig::default(),
            source_attribution: std::collections::HashMap::new(),
        }
    }
}
