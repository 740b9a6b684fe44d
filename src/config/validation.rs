use std::net::SocketAddr;

use crate::config::models::ServerConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        for (field, path) in [
            ("tunnel.control_path", &config.tunnel.control_path),
            ("inspector.path_prefix", &config.inspector.path_prefix),
        ] {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "Paths must start with '/'".to_string(),
                });
            }
        }

        if config.tunnel.control_path == config.inspector.path_prefix {
            errors.push(ValidationError::InvalidField {
                field: "inspector.path_prefix".to_string(),
                message: "Inspector path must differ from the control path".to_string(),
            });
        }

        if config.tunnel.hostname_header.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "tunnel.hostname_header".to_string(),
                message: "Hostname header cannot be empty".to_string(),
            });
        }

        for (field, value) in [
            (
                "dispatch.buffered_timeout_secs",
                config.dispatch.buffered_timeout_secs,
            ),
            (
                "dispatch.replay_timeout_secs",
                config.dispatch.replay_timeout_secs,
            ),
            (
                "recorder.prune_interval_secs",
                config.recorder.prune_interval_secs,
            ),
        ] {
            if value == 0 {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if config.recorder.retention_days <= 0 {
            errors.push(ValidationError::InvalidField {
                field: "recorder.retention_days".to_string(),
                message: "Retention must be at least one day".to_string(),
            });
        }

        if config.recorder.queue_capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "recorder.queue_capacity".to_string(),
                message: "Capture queue must hold at least one entry".to_string(),
            });
        }

        if config.inspector.default_limit == 0
            || config.inspector.default_limit > config.inspector.max_limit
        {
            errors.push(ValidationError::InvalidField {
                field: "inspector.default_limit".to_string(),
                message: format!(
                    "Must be between 1 and max_limit ({})",
                    config.inspector.max_limit
                ),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
