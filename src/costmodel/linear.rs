use std::cell::RefCell;
use std::rc::Rc;

use itertools::Itertools;
use log::{debug, info};
use nalgebra::{DMatrix, DVector};

use crate::collective::Collective;
use crate::costmodel::config::TuningConfig;
use crate::costmodel::history::History;
use crate::costmodel::registry::ModelRegistry;
use crate::costmodel::{format_scientific, CostModel, Sample, MAX_PARAMS};
use crate::error::ModelError;
use crate::linalg::{compress_qr, dot, solve_least_squares, CompressedSystem};

/// A cost model that is linear in its features: `time = max(0, features · coefficients)`.
///
/// The coefficients are refit by [`update`](Self::update), which solves a
/// regularized least-squares problem over the recent samples of all ranks. Each rank
/// compresses its samples into a small triangular system via a QR factorization, the
/// first ranks of the group gather and solve the stacked systems, and the result is
/// broadcast to everyone, so all ranks always agree on the coefficients.
#[derive(Debug, Clone)]
pub struct LinearCostModel {
    name: String,
    config: TuningConfig,
    coefficients: Vec<f64>,
    history: History,
    tuned: bool,
    total_time: f64,
    over_time: f64,
    under_time: f64,
}

impl LinearCostModel {
    /// Creates a model named `name` over `init_guess.len()` features, starting from
    /// the coefficients `init_guess`.
    ///
    /// # Errors
    /// Fails if the number of features is not in `1..=MAX_PARAMS` or `config` does
    /// not pass [`TuningConfig::validate`].
    pub fn new(
        name: impl Into<String>,
        init_guess: &[f64],
        config: TuningConfig,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if !(1..=MAX_PARAMS).contains(&init_guess.len()) {
            return Err(ModelError::ParameterCount {
                name,
                count: init_guess.len(),
                max: MAX_PARAMS,
            });
        }
        Self::with_param_count(name, init_guess.len(), init_guess, config)
    }

    /// Creates a model like [`new`](Self::new) and registers it with `registry`.
    pub fn registered<C: Collective + 'static>(
        name: impl Into<String>,
        init_guess: &[f64],
        config: TuningConfig,
        registry: &mut ModelRegistry<C>,
    ) -> Result<Rc<RefCell<Self>>, ModelError> {
        Ok(registry.register(Self::new(name, init_guess, config)?))
    }

    /// Creates a model over `params` features without an upper bound on their
    /// number, for models expanding a small raw feature vector.
    pub(crate) fn with_param_count(
        name: String,
        params: usize,
        init_guess: &[f64],
        config: TuningConfig,
    ) -> Result<Self, ModelError> {
        if init_guess.len() != params {
            return Err(ModelError::InitialGuessLength {
                name,
                expected: params,
                actual: init_guess.len(),
            });
        }
        if let Err(err) = config.validate() {
            return Err(ModelError::InvalidConfig {
                reason: err.to_string(),
                name,
            });
        }
        Ok(Self {
            history: History::new(config.history_capacity),
            name,
            config,
            coefficients: init_guess.to_vec(),
            tuned: false,
            total_time: 0.0,
            over_time: 0.0,
            under_time: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of features (and coefficients).
    #[inline]
    pub fn param_count(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Whether the model has been refit at least once.
    pub fn is_tuned(&self) -> bool {
        self.tuned
    }

    /// The total number of observations recorded on this rank.
    pub fn observations(&self) -> u64 {
        self.history.observed()
    }

    /// The sum of all observed execution times.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// The accumulated amount by which measurements exceeded the estimate.
    pub fn over_time(&self) -> f64 {
        self.over_time
    }

    /// The accumulated amount by which the estimate exceeded measurements.
    pub fn under_time(&self) -> f64 {
        self.under_time
    }

    /// Predicts the execution time for `features`, clamped to be non-negative.
    ///
    /// # Examples
    /// ```
    /// # use tncplan::costmodel::config::TuningConfig;
    /// # use tncplan::costmodel::linear::LinearCostModel;
    /// let model = LinearCostModel::new("gemm", &[2.0, -1.0], TuningConfig::default()).unwrap();
    /// assert_eq!(model.estimate(&[3.0, 1.0]), 5.0);
    /// assert_eq!(model.estimate(&[1.0, 3.0]), 0.0);
    /// ```
    pub fn estimate(&self, features: &[f64]) -> f64 {
        assert_eq!(
            features.len(),
            self.param_count(),
            "model `{}` expects {} features",
            self.name,
            self.param_count()
        );
        dot(features, &self.coefficients).max(0.0)
    }

    /// Records a measured execution: updates the time accounting and stores the
    /// sample in the history. Does nothing if tuning is disabled.
    ///
    /// # Panics
    /// Panics if the time of the sample is not positive and finite, even when tuning
    /// is disabled, or if the sample has the wrong number of features.
    pub fn observe(&mut self, sample: Sample) {
        assert!(
            sample.time > 0.0 && sample.time.is_finite(),
            "observed execution time must be positive, got {}",
            sample.time
        );
        if !self.config.enabled {
            return;
        }
        let estimate = self.estimate(&sample.features);
        self.total_time += sample.time;
        if estimate > sample.time {
            self.under_time += estimate - sample.time;
        } else {
            self.over_time += sample.time - estimate;
        }
        self.history.push(sample);
    }

    /// Refits the coefficients from the samples of all ranks in `group`.
    ///
    /// This is a collective operation: all ranks of `group` must call it together
    /// and hold this model with the same configuration. If the ranks hold fewer
    /// than `samples_per_parameter` samples per rank and parameter in total, nothing
    /// changes. Otherwise the model becomes tuned and all ranks end up with the same
    /// new coefficients.
    ///
    /// # Panics
    /// Panics if the least-squares solve fails.
    pub fn update<C: Collective>(&mut self, group: &C) {
        if !self.config.enabled {
            return;
        }
        let params = self.param_count();
        let ranks = group.size();
        let rank = group.rank();

        let local_count = self.history.len();
        let total_count = group.all_reduce_sum(local_count as u64);
        let required = (self.config.samples_per_parameter * ranks * params) as u64;
        if total_count < required {
            debug!(name = self.name.as_str(), total_count, required; "Not enough observations to tune model");
            return;
        }
        self.tuned = true;

        // Ranks without samples take part with 0
        let local_max = self
            .history
            .as_slice()
            .iter()
            .map(|sample| sample.time)
            .fold(0.0, f64::max);
        let max_time = group.all_reduce_max(local_max);

        let fit_ranks = ranks.min(self.config.max_fit_ranks);
        let in_fit_group = rank < fit_ranks;
        let fit_group = group.split(usize::from(in_fit_group), rank);
        if in_fit_group {
            let summary = if local_count < params {
                CompressedSystem::zeros(params)
            } else {
                self.local_system(max_time)
            };
            self.coefficients = solve_stacked(&summary, &fit_group);
        }
        group.broadcast(0, &mut self.coefficients);
        info!(name = self.name.as_str(), total_count, max_time, coefficients:? = self.coefficients; "Tuned model");
    }

    /// Builds the local least-squares system from the history and compresses it.
    ///
    /// The system consists of `params` regularization equations `λ x_i = 0` followed
    /// by one equation `features · x = time` per sample that is not below the noise
    /// floor `noise_floor_fraction * max_time`, oldest sample first.
    fn local_system(&self, max_time: f64) -> CompressedSystem {
        let params = self.param_count();
        let noise_floor = max_time * self.config.noise_floor_fraction;
        let retained = self
            .history
            .chronological()
            .filter(|sample| sample.time >= noise_floor)
            .collect_vec();
        debug!(
            name = self.name.as_str(),
            held = self.history.len(),
            capacity = self.history.capacity(),
            retained = retained.len(),
            noise_floor;
            "Building local system"
        );

        let rows = params + retained.len();
        let mut a = DMatrix::<f64>::zeros(rows, params);
        let mut b = DVector::<f64>::zeros(rows);
        a.view_mut((0, 0), (params, params))
            .fill_diagonal(self.config.regularization);
        for (row, sample) in retained.iter().enumerate() {
            let row = params + row;
            for (col, &feature) in sample.features.iter().enumerate() {
                a[(row, col)] = feature;
            }
            b[row] = sample.time;
        }
        compress_qr(a, b)
    }

    /// Coefficients as a C array initializer.
    pub fn describe(&self) -> String {
        format!(
            "double {}_init[] = {{{}}};",
            self.name,
            self.coefficients
                .iter()
                .map(|&c| format_scientific(c))
                .join(", ")
        )
    }

    /// Tuning state and time accounting in one line.
    pub fn describe_usage(&self) -> String {
        format!(
            "{} is_tuned = {} ({}) tot_time = {:.6} over_time = {:.6} under_time = {:.6}",
            self.name,
            u8::from(self.tuned),
            self.observations(),
            self.total_time,
            self.over_time,
            self.under_time
        )
    }
}

/// Gathers the compressed systems of all ranks in `fit_group`, stacks them and
/// solves the result. Every rank of the group computes the same solution.
fn solve_stacked<C: Collective>(summary: &CompressedSystem, fit_group: &C) -> Vec<f64> {
    let params = summary.unknowns();
    let ranks = fit_group.size();

    // Row-major, so the gathered blocks stack vertically
    let local_r = summary.r.transpose();
    let all_r = fit_group.all_gather(local_r.as_slice());
    let all_rhs = fit_group.all_gather(summary.rhs.as_slice());

    let a = DMatrix::from_row_slice(ranks * params, params, &all_r);
    let b = DVector::from_vec(all_rhs);
    solve_least_squares(a, &b).as_slice().to_vec()
}

impl<C: Collective> CostModel<C> for LinearCostModel {
    fn name(&self) -> &str {
        LinearCostModel::name(self)
    }

    fn observe(&mut self, sample: Sample) {
        LinearCostModel::observe(self, sample);
    }

    fn estimate(&self, features: &[f64]) -> f64 {
        LinearCostModel::estimate(self, features)
    }

    fn update(&mut self, group: &C) {
        LinearCostModel::update(self, group);
    }

    fn describe(&self) -> String {
        LinearCostModel::describe(self)
    }

    fn describe_usage(&self) -> String {
        LinearCostModel::describe_usage(self)
    }
}
