//! Bond Common - configuration, error types and logging shared by the
//! bond screener crates.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, CriterionConfig, DisplayConfig, EnrichConfig, IssConfig, ObservabilityConfig,
    ScreenerConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
    pub use crate::validation::Validate;
}
