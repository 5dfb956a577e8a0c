//! CLI-specific error types and exit code mapping

use faultline_core::error::FaultlineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// One or more failure plans failed validation.
    #[error("{0} failure plan(s) invalid")]
    InvalidPlans(usize),

    /// No trial completed: every one failed inside the harness itself.
    #[error("no trial completed ({0} failed in the harness)")]
    EngineFailed(usize),

    /// A shutdown signal stopped the campaign before every trial ran.
    #[error("campaign interrupted by shutdown signal after {0} trial(s)")]
    Interrupted(usize),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from faultline-core.
    #[error("{0}")]
    Core(#[from] FaultlineError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration error                      |
    /// | 3    | Failure plan or invariant list malformed |
    /// | 4    | Engine failure: no trial completed       |
    /// | 10   | IO error                                 |
    /// | 130  | Interrupted by SIGINT/SIGTERM            |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(FaultlineError::Config(_)) => 2,
            Self::InvalidPlans(_) | Self::Core(FaultlineError::Parse(_)) => 3,
            Self::EngineFailed(_) => 4,
            Self::Io(_) | Self::Core(FaultlineError::Io(_)) => 10,
            Self::Interrupted(_) => 130,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::error::{ConfigError, PlanError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err = CliError::Core(FaultlineError::Config(ConfigError::InvalidValue {
            field: "channel.max_connections".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2, "core config error should map to 2");
    }

    #[test]
    fn test_exit_code_plan_error() {
        let err = CliError::Core(FaultlineError::Parse(PlanError::NoInvariants {
            path: "selected-invariants.txt".to_owned(),
        }));
        assert_eq!(err.exit_code(), 3, "plan error should return exit code 3");
    }

    #[test]
    fn test_exit_code_invalid_plans() {
        let err = CliError::InvalidPlans(1);
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "1 failure plan(s) invalid");
    }

    #[test]
    fn test_exit_code_engine_failed() {
        let err = CliError::EngineFailed(2);
        assert_eq!(err.exit_code(), 4);
        assert_eq!(err.to_string(), "no trial completed (2 failed in the harness)");
    }

    #[test]
    fn test_exit_code_interrupted() {
        let err = CliError::Interrupted(3);
        assert_eq!(err.exit_code(), 130);
        assert_eq!(
            err.to_string(),
            "campaign interrupted by shutdown signal after 3 trial(s)"
        );
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_core_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "driver.sh");
        let err = CliError::Core(FaultlineError::Io(io_err));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(
            err.exit_code(),
            1,
            "command error should return exit code 1"
        );
    }

    #[test]
    fn test_exit_code_json_serialize_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json")
            .expect_err("should fail parsing");
        let err = CliError::JsonSerialize(json_err);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_error_display_config() {
        let err = CliError::Config("invalid TOML syntax".to_owned());
        let display_str = format!("{}", err);
        assert!(display_str.contains("configuration error"));
        assert!(display_str.contains("invalid TOML syntax"));
    }

    #[test]
    fn test_from_core_error() {
        let core_err = FaultlineError::Config(ConfigError::FileNotFound {
            path: "faultline.toml".to_owned(),
        });
        let cli_err: CliError = core_err.into();
        match cli_err {
            CliError::Core(_) => {}
            _ => panic!("expected Core error variant"),
        }
    }
}
