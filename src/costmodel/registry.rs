use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info};

use crate::collective::Collective;
use crate::costmodel::CostModel;

/// The cost models of one process that take part in bulk tuning passes.
///
/// Models are registered once at construction (see
/// [`LinearCostModel::registered`](crate::costmodel::linear::LinearCostModel::registered))
/// and stay registered for the lifetime of the registry. The registry is owned by
/// the driver and local to its process; it is not meant to be shared between
/// threads.
pub struct ModelRegistry<C> {
    models: Vec<Rc<RefCell<dyn CostModel<C>>>>,
}

impl<C> Default for ModelRegistry<C> {
    fn default() -> Self {
        Self { models: Vec::new() }
    }
}

impl<C: Collective> ModelRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `model` and returns a shared handle to it.
    pub fn register<M>(&mut self, model: M) -> Rc<RefCell<M>>
    where
        M: CostModel<C> + 'static,
    {
        debug!(name = model.name(), index = self.models.len(); "Registered cost model");
        let model = Rc::new(RefCell::new(model));
        self.models.push(model.clone());
        model
    }

    /// The number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Refits all models in registration order. Collective over `group`: every rank
    /// must have registered the same models in the same order.
    pub fn update_all(&self, group: &C) {
        debug!(models = self.models.len(); "Updating all cost models");
        for model in &self.models {
            model.borrow_mut().update(group);
        }
    }

    /// Returns the coefficient dump of every model followed by the usage line of
    /// every model, in registration order, and logs each line.
    pub fn describe_all(&self) -> Vec<String> {
        let descriptions = self.models.iter().map(|model| model.borrow().describe());
        let usages = self
            .models
            .iter()
            .map(|model| model.borrow().describe_usage());
        let lines = descriptions.chain(usages).collect::<Vec<_>>();
        for line in &lines {
            info!("{line}");
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::collective::threaded::ThreadGroup;
    use crate::costmodel::config::TuningConfig;
    use crate::costmodel::cubic::CubicCostModel;
    use crate::costmodel::linear::LinearCostModel;
    use crate::costmodel::Sample;

    #[test]
    fn test_describe_all_order() {
        let mut registry = ModelRegistry::<ThreadGroup>::new();
        let first =
            LinearCostModel::registered("first", &[1.0], TuningConfig::default(), &mut registry)
                .unwrap();
        CubicCostModel::registered("second", 1, &[0.0; 3], TuningConfig::default(), &mut registry)
            .unwrap();
        first.borrow_mut().observe(Sample::new(2.0, vec![1.0]));

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.describe_all(),
            vec![
                "double first_init[] = {1.0000E+00};",
                "double second_init[] = {0.0000E+00, 0.0000E+00, 0.0000E+00};",
                "first is_tuned = 0 (1) tot_time = 2.000000 over_time = 1.000000 under_time = 0.000000",
                "second is_tuned = 0 (0) tot_time = 0.000000 over_time = 0.000000 under_time = 0.000000",
            ]
        );
    }

    #[test]
    fn test_update_all() {
        let results = ThreadGroup::run(2, |group| {
            let mut registry = ModelRegistry::new();
            let config = TuningConfig::default();
            let fed = LinearCostModel::registered("fed", &[0.0], config.clone(), &mut registry)
                .unwrap();
            let starved =
                LinearCostModel::registered("starved", &[7.0], config, &mut registry).unwrap();

            for i in 0..16 {
                let feature = 1e7 + 1e5 * f64::from(i);
                fed.borrow_mut()
                    .observe(Sample::new(2e-8 * feature, vec![feature]));
            }
            starved.borrow_mut().observe(Sample::new(1.0, vec![1.0]));
            registry.update_all(&group);

            let fed = fed.borrow();
            let starved = starved.borrow();
            (
                fed.is_tuned(),
                fed.coefficients()[0],
                starved.is_tuned(),
                starved.coefficients()[0],
            )
        });

        for (fed_tuned, fed_coefficient, starved_tuned, starved_coefficient) in results {
            assert!(fed_tuned);
            assert!((fed_coefficient - 2e-8).abs() < 1e-11);
            assert!(!starved_tuned);
            assert_eq!(starved_coefficient, 7.0);
        }
    }
}
