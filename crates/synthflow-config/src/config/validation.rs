use synthflow_utils::error::ConfigError;

use super::Config;

const MIN_TIMEOUT_SECS: u64 = 5;
const MAX_TIMEOUT_SECS: u64 = 7200;

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        let t = &self.gateway.timeouts;
        for (key, secs) in [
            ("gateway.timeouts.stage1", t.stage1),
            ("gateway.timeouts.stage2", t.stage2),
            ("gateway.timeouts.stage3", t.stage3),
            ("gateway.timeouts.stage4", t.stage4),
            ("gateway.timeouts.stage5", t.stage5),
            ("gateway.timeouts.stage6", t.stage6),
        ] {
            if secs < MIN_TIMEOUT_SECS {
                return Err(invalid(key, format!("must be at least {MIN_TIMEOUT_SECS} seconds")));
            }
            if secs > MAX_TIMEOUT_SECS {
                return Err(invalid(
                    key,
                    format!("exceeds maximum limit of {MAX_TIMEOUT_SECS} seconds (2 hours)"),
                ));
            }
        }

        if self.gateway.connect_timeout_secs == Some(0) {
            return Err(invalid("gateway.connect_timeout_secs", "must be greater than 0"));
        }

        for (key, url) in &self.gateway.endpoints {
            let trimmed = url.trim();
            if !trimmed.is_empty()
                && !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
            {
                return Err(invalid(
                    &format!("gateway.endpoints.{key}"),
                    "must be an http:// or https:// URL",
                ));
            }
        }

        let p = &self.pipeline;
        for (key, value) in [
            ("pipeline.min_input_words", p.min_input_words),
            ("pipeline.max_outcome_words", p.max_outcome_words),
            ("pipeline.paper_chunk_size", p.paper_chunk_size),
            ("pipeline.repository_first_chunk", p.repository_first_chunk),
            ("pipeline.repository_chunk_size", p.repository_chunk_size),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than 0"));
            }
        }

        Ok(())
    }
}
