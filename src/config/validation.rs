use std::net::SocketAddr;

use http::HeaderValue;

use crate::{
    config::models::{LoggingConfig, ProxyConfig, TransformerConfig, TransportConfig},
    core::target::Target,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration errors. Any of these is fatal at startup.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Proxy configuration validator
pub struct ProxyConfigValidator;

impl ProxyConfigValidator {
    /// Validate the entire proxy configuration, reporting every problem at once
    pub fn validate(config: &ProxyConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.targets.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "targets".to_string(),
            });
        } else {
            for (i, url) in config.targets.iter().enumerate() {
                if let Err(e) = Target::parse(url) {
                    errors.push(ValidationError::InvalidField {
                        field: format!("targets[{i}]"),
                        message: e.to_string(),
                    });
                }
            }
        }

        if HeaderValue::from_str(&config.default_user_agent).is_err() {
            errors.push(ValidationError::InvalidField {
                field: "default_user_agent".to_string(),
                message: "Must be a valid HTTP header value".to_string(),
            });
        }

        errors.extend(Self::validate_transport(&config.transport));
        errors.extend(Self::validate_transformer(&config.transformer));
        errors.extend(Self::validate_logging(&config.logging));

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
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:2000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_transport(config: &TransportConfig) -> Vec<ValidationError> {
        let must_be_positive = [
            ("transport.connect_timeout_secs", config.connect_timeout_secs),
            ("transport.idle_timeout_secs", config.idle_timeout_secs),
            (
                "transport.tls_handshake_timeout_secs",
                config.tls_handshake_timeout_secs,
            ),
        ];

        must_be_positive
            .into_iter()
            .filter(|(_, value)| *value == 0)
            .map(|(field, _)| ValidationError::InvalidField {
                field: field.to_string(),
                message: "Must be greater than 0".to_string(),
            })
            .collect()
    }

    fn validate_transformer(config: &TransformerConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if config.body_read_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "transformer.body_read_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        errors
    }

    fn validate_logging(config: &LoggingConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if config.level.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: "Log level cannot be empty".to_string(),
            });
        }
        errors
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} configuration errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
