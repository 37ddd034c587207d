//! Configuration validation.
//!
//! Catches values that would only fail later, mid-run: unparsable URLs,
//! zero timeouts, an empty mode list and the like. Criteria are validated
//! separately by the screener since only it knows the operator semantics.

use std::str::FromStr;
use thiserror::Error;

use crate::config::{Config, DisplayConfig, IssConfig, ObservabilityConfig, ScreenerConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Upper bound on `iss.max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Upper bound on `screener.enrich.history_days` (ten years).
pub const MAX_HISTORY_DAYS: u32 = 3650;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.iss.validate() {
            errors.push(e);
        }
        if let Err(e) = self.screener.validate() {
            errors.push(e);
        }
        if let Err(e) = self.display.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

fn validate_url(field: &str, value: &str) -> ValidationResult<()> {
    let parsed = url::Url::parse(value).map_err(|e| ValidationError::InvalidValue {
        field: field.into(),
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(())
}

impl Validate for IssConfig {
    fn validate(&self) -> ValidationResult<()> {
        validate_url("iss.base_url", &self.base_url)?;
        validate_url("iss.auth_url", &self.auth_url)?;

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "iss.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.page_size == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "iss.page_size".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }

        if self.max_retries > MAX_RETRIES {
            return Err(ValidationError::InvalidValue {
                field: "iss.max_retries".into(),
                reason: format!("must be at most {}", MAX_RETRIES),
            });
        }

        if self.max_concurrent_requests == 0 {
            return Err(ValidationError::InvalidValue {
                field: "iss.max_concurrent_requests".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.user.is_some() && self.password.is_none() {
            return Err(ValidationError::MissingField {
                field: "iss.password".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.modes.is_empty() {
            return Err(ValidationError::MissingField {
                field: "screener.modes".into(),
            });
        }

        if let Some(blank) = self.modes.iter().position(|m| m.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: format!("screener.modes[{}]", blank),
                reason: "trading mode code is empty".into(),
            });
        }

        if self.enrich.trade_history && self.enrich.history_days == 0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.enrich.history_days".into(),
                reason: "must be greater than 0 when trade history is enabled".into(),
            });
        }

        if self.enrich.history_days > MAX_HISTORY_DAYS {
            return Err(ValidationError::InvalidValue {
                field: "screener.enrich.history_days".into(),
                reason: format!("must be at most {}", MAX_HISTORY_DAYS),
            });
        }

        Ok(())
    }
}

impl Validate for DisplayConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !matches!(
            self.format.to_lowercase().as_str(),
            "table" | "markdown" | "md" | "json"
        ) {
            return Err(ValidationError::InvalidValue {
                field: "display.format".into(),
                reason: format!("unknown format '{}'", self.format),
            });
        }

        if self.limit == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "display.limit".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if tracing::Level::from_str(&self.log_level).is_err() {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("unknown level '{}'", self.log_level),
            });
        }

        Ok(())
    }
}
