//! Process exit codes for the synthflow binary.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Command completed |
//! | 1 | `INTERNAL` | Runtime, IO or server failure |
//! | 2 | `CONFIG` | Invalid configuration or CLI arguments |
//! | 3 | `UNREACHABLE` | `probe` found an endpoint missing or unreachable |

use synthflow_utils::error::SynthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const INTERNAL: ExitCode = ExitCode(1);
    pub const CONFIG: ExitCode = ExitCode(2);
    pub const UNREACHABLE: ExitCode = ExitCode(3);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl From<&SynthError> for ExitCode {
    fn from(err: &SynthError) -> Self {
        match err {
            SynthError::Config(_) => Self::CONFIG,
            SynthError::Gateway(e) if e.is_fatal() => Self::CONFIG,
            _ => Self::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthflow_utils::error::{ConfigError, GatewayError};

    #[test]
    fn test_error_exit_codes() {
        let config = SynthError::Config(ConfigError::InvalidFile("bad".into()));
        assert_eq!(ExitCode::from(&config), ExitCode::CONFIG);

        let misconfigured = SynthError::Gateway(GatewayError::Misconfiguration("tls".into()));
        assert_eq!(ExitCode::from(&misconfigured).as_i32(), 2);

        let io = SynthError::Io(std::io::Error::other("boom"));
        assert_eq!(ExitCode::from(&io), ExitCode::INTERNAL);
    }
}
