use std::cell::RefCell;
use std::rc::Rc;

use crate::collective::Collective;
use crate::costmodel::config::TuningConfig;
use crate::costmodel::linear::LinearCostModel;
use crate::costmodel::registry::ModelRegistry;
use crate::costmodel::{CostModel, Sample, MAX_PARAMS};
use crate::error::ModelError;

/// The number of features produced by [`cube_features`] for `k` raw features.
///
/// # Examples
/// ```
/// # use tncplan::costmodel::cubic::cubic_param_count;
/// assert_eq!(cubic_param_count(1), 3);
/// assert_eq!(cubic_param_count(2), 9);
/// assert_eq!(cubic_param_count(4), 34);
/// ```
pub const fn cubic_param_count(k: usize) -> usize {
    k + k * (k + 1) / 2 + k * (k + 1) * (k + 2) / 6
}

/// Expands `params` into all monomials of degree one to three.
///
/// The output holds the raw features, then the products `p[i] * p[j]` for `j <= i`
/// in row-major lower triangular order, then the products `p[i] * p[j] * p[l]` for
/// `l <= j <= i`, nested the same way. For `[x, y]` this is
/// `[x, y, xx, xy, yy, xxx, xxy, xyy, yyy]`.
pub fn cube_features(params: &[f64]) -> Vec<f64> {
    let k = params.len();
    let mut features = Vec::with_capacity(cubic_param_count(k));
    features.extend_from_slice(params);

    let mut cubic = Vec::with_capacity(k * (k + 1) * (k + 2) / 6);
    for i in 0..k {
        for j in 0..=i {
            let square = params[i] * params[j];
            features.push(square);
            cubic.extend(params[..=j].iter().map(|p| square * p));
        }
    }
    features.extend(cubic);
    features
}

/// A cost model that is a cubic polynomial in its features, implemented as a
/// [`LinearCostModel`] over the expanded features of [`cube_features`].
#[derive(Debug, Clone)]
pub struct CubicCostModel {
    raw_params: usize,
    linear: LinearCostModel,
}

impl CubicCostModel {
    /// Creates a model over `raw_params` features. `init_guess` holds the
    /// coefficients of the expanded features, i.e., `cubic_param_count(raw_params)`
    /// values.
    ///
    /// # Errors
    /// Fails if `raw_params` is not in `1..=MAX_PARAMS`, the initial guess has the
    /// wrong length or `config` does not pass [`TuningConfig::validate`].
    pub fn new(
        name: impl Into<String>,
        raw_params: usize,
        init_guess: &[f64],
        config: TuningConfig,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if !(1..=MAX_PARAMS).contains(&raw_params) {
            return Err(ModelError::ParameterCount {
                name,
                count: raw_params,
                max: MAX_PARAMS,
            });
        }
        let linear = LinearCostModel::with_param_count(
            name,
            cubic_param_count(raw_params),
            init_guess,
            config,
        )?;
        Ok(Self { raw_params, linear })
    }

    /// Creates a model like [`new`](Self::new) and registers it with `registry`.
    pub fn registered<C: Collective + 'static>(
        name: impl Into<String>,
        raw_params: usize,
        init_guess: &[f64],
        config: TuningConfig,
        registry: &mut ModelRegistry<C>,
    ) -> Result<Rc<RefCell<Self>>, ModelError> {
        Ok(registry.register(Self::new(name, raw_params, init_guess, config)?))
    }

    /// The number of raw (unexpanded) features.
    pub fn raw_param_count(&self) -> usize {
        self.raw_params
    }

    /// The underlying linear model over the expanded features.
    pub fn linear(&self) -> &LinearCostModel {
        &self.linear
    }

    fn expand(&self, features: &[f64]) -> Vec<f64> {
        assert_eq!(
            features.len(),
            self.raw_params,
            "model `{}` expects {} features",
            self.linear.name(),
            self.raw_params
        );
        cube_features(features)
    }

    pub fn observe(&mut self, sample: Sample) {
        let features = self.expand(&sample.features);
        self.linear.observe(Sample::new(sample.time, features));
    }

    pub fn estimate(&self, features: &[f64]) -> f64 {
        self.linear.estimate(&self.expand(features))
    }

    pub fn update<C: Collective>(&mut self, group: &C) {
        self.linear.update(group);
    }
}

impl<C: Collective> CostModel<C> for CubicCostModel {
    fn name(&self) -> &str {
        self.linear.name()
    }

    fn observe(&mut self, sample: Sample) {
        CubicCostModel::observe(self, sample);
    }

    fn estimate(&self, features: &[f64]) -> f64 {
        CubicCostModel::estimate(self, features)
    }

    fn update(&mut self, group: &C) {
        CubicCostModel::update(self, group);
    }

    fn describe(&self) -> String {
        self.linear.describe()
    }

    fn describe_usage(&self) -> String {
        self.linear.describe_usage()
    }
}
