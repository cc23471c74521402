use log::debug;

use crate::topology::{find_topology, Topology};

/// An append-only collection of all distinct grid shapes discovered so far.
///
/// Two grids are considered equal if they have the same extents in the same order
/// (see [`Topology::same_shape`]). Indices handed out by [`register`](Self::register)
/// stay valid for the lifetime of the registry.
#[derive(Debug)]
pub struct TopologyRegistry<C> {
    topologies: Vec<Topology<C>>,
}

impl<C> Default for TopologyRegistry<C> {
    fn default() -> Self {
        Self {
            topologies: Vec::new(),
        }
    }
}

impl<C> TopologyRegistry<C> {
    /// Returns the index of the first registered grid with the shape of `target`.
    pub fn find(&self, target: &Topology<C>) -> Option<usize> {
        find_topology(target, &self.topologies)
    }

    /// Registers `topology` unless a grid with the same shape is already known.
    /// Returns the index of the (new or existing) entry.
    pub fn register(&mut self, topology: Topology<C>) -> usize {
        if let Some(index) = self.find(&topology) {
            return index;
        }
        debug!(index = self.topologies.len(), topology:%; "Registered new topology");
        self.topologies.push(topology);
        self.topologies.len() - 1
    }

    /// The grid at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> &Topology<C> {
        &self.topologies[index]
    }

    /// The number of registered grids.
    pub fn len(&self) -> usize {
        self.topologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topologies.is_empty()
    }

    /// Iterates over all grids in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Topology<C>> {
        self.topologies.iter()
    }
}

impl<'a, C> IntoIterator for &'a TopologyRegistry<C> {
    type Item = &'a Topology<C>;
    type IntoIter = std::slice::Iter<'a, Topology<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.topologies.iter()
    }
}
