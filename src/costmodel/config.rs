use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Knobs of the online model fitting. The defaults are the values the models were
/// calibrated with and should rarely need changing.
///
/// All ranks holding a model must use the same configuration, since several of the
/// fields decide whether and how ranks take part in the collective update.
///
/// # Examples
/// ```
/// # use tncplan::costmodel::config::TuningConfig;
/// let config = TuningConfig::from_json(r#"{ "history_capacity": 64 }"#).unwrap();
/// assert!(config.enabled);
/// assert_eq!(config.history_capacity, 64);
/// assert_eq!(config.max_fit_ranks, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuningConfig {
    /// Whether models record observations and refit. When disabled, models keep
    /// their initial coefficients.
    pub enabled: bool,
    /// The number of most recent samples each model keeps.
    pub history_capacity: usize,
    /// Weight of the synthetic equations pulling each coefficient towards zero.
    pub regularization: f64,
    /// Samples faster than this fraction of the slowest observed sample are ignored
    /// when fitting, as short operations are dominated by noise.
    pub noise_floor_fraction: f64,
    /// A model is only refit once the ranks hold at least this many samples per
    /// rank and parameter in total.
    pub samples_per_parameter: usize,
    /// At most this many ranks contribute their data to a fit.
    pub max_fit_ranks: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_capacity: 1024,
            regularization: 1e5,
            noise_floor_fraction: 1.0 / 3.0,
            samples_per_parameter: 16,
            max_fit_ranks: 32,
        }
    }
}

impl TuningConfig {
    /// A configuration with tuning switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Parses a configuration from JSON. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all values are in their valid ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be positive".into(),
            ));
        }
        if self.samples_per_parameter == 0 {
            return Err(ConfigError::Invalid(
                "samples_per_parameter must be positive".into(),
            ));
        }
        if self.max_fit_ranks == 0 {
            return Err(ConfigError::Invalid("max_fit_ranks must be positive".into()));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            )));
        }
        if !(0.0..=1.0).contains(&self.noise_floor_fraction) {
            return Err(ConfigError::Invalid(format!(
                "noise_floor_fraction must be in [0, 1], got {}",
                self.noise_floor_fraction
            )));
        }
        Ok(())
    }
}
