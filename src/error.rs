//! Errors reported while setting up cost models.

use thiserror::Error;

/// Invalid arguments when constructing a cost model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("model `{name}` has {count} parameters, but only 1 to {max} are supported")]
    ParameterCount {
        name: String,
        count: usize,
        max: usize,
    },
    #[error("initial guess of model `{name}` has {actual} coefficients, expected {expected}")]
    InitialGuessLength {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("model `{name}` has an invalid tuning configuration: {reason}")]
    InvalidConfig { name: String, reason: String },
}

/// Errors while reading a tuning configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse tuning configuration")]
    Parse(#[from] serde_json::Error),
    #[error("invalid tuning configuration: {0}")]
    Invalid(String),
}
