//! Self-calibrating estimators of operation execution time.
//!
//! A cost model predicts how long an operation takes from a small vector of
//! features describing it (e.g., flop count and message volume). Models start from
//! an initial coefficient guess, record measured execution times with
//! [`CostModel::observe`], and are refit from time to time with the collective
//! [`CostModel::update`], usually for all models at once through a
//! [`ModelRegistry`](registry::ModelRegistry).

use crate::collective::Collective;

pub mod config;
pub mod cubic;
pub mod history;
pub mod linear;
pub mod registry;

/// The largest number of raw features a model accepts.
pub const MAX_PARAMS: usize = 4;

/// A measured execution time together with the features of the operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub features: Vec<f64>,
}

impl Sample {
    /// Creates a new sample.
    ///
    /// # Panics
    /// Panics unless `time` is positive and finite. A non-positive duration can not
    /// come from a real measurement and indicates a bug in the caller.
    pub fn new(time: f64, features: Vec<f64>) -> Self {
        assert!(
            time > 0.0 && time.is_finite(),
            "observed execution time must be positive, got {time}"
        );
        Self { time, features }
    }
}

/// The capability shared by all cost models.
///
/// `update` is collective over the group `C`: every rank holding the model must
/// call it at the same logical point, otherwise the group deadlocks.
pub trait CostModel<C: Collective> {
    /// The name used in diagnostics.
    fn name(&self) -> &str;

    /// Records a measured execution.
    fn observe(&mut self, sample: Sample);

    /// Predicts the execution time for the given features. Never negative.
    fn estimate(&self, features: &[f64]) -> f64;

    /// Refits the model from the samples of all ranks in `group`.
    fn update(&mut self, group: &C);

    /// The coefficients as a C array initializer, usable as initial guess of a
    /// later run.
    fn describe(&self) -> String;

    /// A one-line summary of the tuning state and time accounting.
    fn describe_usage(&self) -> String;
}

/// Formats `value` like C's `%1.4E`, i.e., with a signed exponent of at least two
/// digits.
///
/// # Examples
/// ```
/// # use tncplan::costmodel::format_scientific;
/// assert_eq!(format_scientific(1.234), "1.2340E+00");
/// assert_eq!(format_scientific(-5.0e-9), "-5.0000E-09");
/// assert_eq!(format_scientific(0.0), "0.0000E+00");
/// ```
pub fn format_scientific(value: f64) -> String {
    let formatted = format!("{value:.4E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent = exponent.parse::<i32>().unwrap_or_default();
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}E{sign}{:02}", exponent.abs())
        }
        // inf and NaN have no exponent
        None => formatted,
    }
}
