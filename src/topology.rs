//! Cartesian process grids ("topologies") and their lower-dimensional foldings.
//!
//! A [`Topology`] arranges the processes of a global group on an n-dimensional
//! grid. Each axis is backed by its own communication group containing exactly the
//! processes that differ only in their coordinate along that axis.

use std::fmt;
use std::rc::Rc;

use itertools::Itertools;
use log::debug;

use crate::collective::Collective;

pub mod folding;
pub mod registry;

/// The communication group of one grid axis, together with the position of the
/// calling process on that axis.
#[derive(Debug)]
pub struct AxisComm<C> {
    group: Rc<C>,
    rank: usize,
    size: usize,
}

impl<C> Clone for AxisComm<C> {
    fn clone(&self) -> Self {
        Self {
            group: Rc::clone(&self.group),
            rank: self.rank,
            size: self.size,
        }
    }
}

impl<C: Collective> AxisComm<C> {
    /// Wraps `group`, reading rank and size from it.
    pub fn new(group: C) -> Self {
        let rank = group.rank();
        let size = group.size();
        Self {
            group: Rc::new(group),
            rank,
            size,
        }
    }
}

impl<C> AxisComm<C> {
    /// The communication group along this axis.
    pub fn group(&self) -> &C {
        &self.group
    }

    /// The coordinate of the calling process along this axis.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The extent of the grid along this axis.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// An n-dimensional grid of processes with one communication group per axis.
///
/// Axes are laid out in row-major order with axis 0 being the fastest: the stride
/// of axis `i` is `lda[i] = size[0] * ... * size[i - 1]`, so a process with
/// coordinates `c` has the rank `sum(c[i] * lda[i])` in the global group.
#[derive(Debug)]
pub struct Topology<C> {
    axes: Vec<AxisComm<C>>,
    lda: Vec<usize>,
}

impl<C> Clone for Topology<C> {
    fn clone(&self) -> Self {
        Self {
            axes: self.axes.clone(),
            lda: self.lda.clone(),
        }
    }
}

impl<C> Topology<C> {
    /// Creates a topology from its axes and computes the stride table.
    pub fn new(axes: Vec<AxisComm<C>>) -> Self {
        let lda = axes
            .iter()
            .scan(1, |stride, axis| {
                let current = *stride;
                *stride *= axis.size;
                Some(current)
            })
            .collect();
        Self { axes, lda }
    }

    /// The number of axes.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// All axes, fastest first.
    pub fn axes(&self) -> &[AxisComm<C>] {
        &self.axes
    }

    /// The axis `i`.
    pub fn axis(&self, i: usize) -> &AxisComm<C> {
        &self.axes[i]
    }

    /// The stride table: `lda()[i]` is the global rank offset of one step along axis
    /// `i`.
    pub fn lda(&self) -> &[usize] {
        &self.lda
    }

    /// The extents of all axes.
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(AxisComm::size).collect()
    }

    /// The coordinates of the calling process.
    pub fn coordinates(&self) -> Vec<usize> {
        self.axes.iter().map(AxisComm::rank).collect()
    }

    /// The number of processes addressed by this grid.
    pub fn num_processes(&self) -> usize {
        self.axes.iter().map(AxisComm::size).product()
    }

    /// Whether both grids have the same number of axes with the same extents, in
    /// the same order. Grids whose axes are permutations of each other are *not*
    /// considered equal.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.ndim() == other.ndim()
            && self
                .axes
                .iter()
                .zip(&other.axes)
                .all(|(a, b)| a.size == b.size)
    }
}

impl<C: Collective> Topology<C> {
    /// Arranges the processes of `global` on a row-major grid of the given `shape`
    /// by splitting off one communication group per axis.
    ///
    /// # Panics
    /// Panics if the product of `shape` differs from the size of `global`.
    pub fn from_shape(global: &C, shape: &[usize]) -> Self {
        let total = shape.iter().product::<usize>();
        assert_eq!(
            total,
            global.size(),
            "grid {shape:?} does not cover the {} processes of the group",
            global.size()
        );

        let global_rank = global.rank();
        let mut stride = 1;
        let mut axes = Vec::with_capacity(shape.len());
        for &size in shape {
            let coordinate = (global_rank / stride) % size;
            // All processes that only differ along this axis share a color
            let color = global_rank - coordinate * stride;
            let group = global.split(color, coordinate);
            assert_eq!(group.size(), size, "axis group has the wrong size");
            axes.push(AxisComm::new(group));
            stride *= size;
        }

        let topology = Self::new(axes);
        debug!(global_rank, topology:%; "Created topology");
        topology
    }
}

impl<C> fmt::Display for Topology<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.axes.iter().map(AxisComm::size).join("x"))
    }
}

/// Searches `topologies` for a grid with the same shape as `target` (see
/// [`Topology::same_shape`]) and returns the index of the first match.
pub fn find_topology<C>(target: &Topology<C>, topologies: &[Topology<C>]) -> Option<usize> {
    topologies.iter().position(|topology| topology.same_shape(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::collective::threaded::ThreadGroup;

    /// A group handle that only knows its shape, for tests that do not communicate.
    #[derive(Debug)]
    pub(crate) struct FakeGroup {
        pub rank: usize,
        pub size: usize,
    }

    impl Collective for FakeGroup {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn all_reduce_sum(&self, value: u64) -> u64 {
            value
        }

        fn all_reduce_max(&self, value: f64) -> f64 {
            value
        }

        fn all_gather(&self, local: &[f64]) -> Vec<f64> {
            local.to_vec()
        }

        fn broadcast(&self, _root: usize, _data: &mut [f64]) {}

        fn split(&self, _color: usize, _key: usize) -> Self {
            unimplemented!()
        }
    }

    pub(crate) fn grid(shape: &[usize]) -> Topology<FakeGroup> {
        Topology::new(
            shape
                .iter()
                .map(|&size| AxisComm::new(FakeGroup { rank: 0, size }))
                .collect(),
        )
    }

    #[test]
    fn test_lda() {
        let topology = grid(&[2, 3, 4]);
        assert_eq!(topology.ndim(), 3);
        assert_eq!(topology.lda(), &[1, 2, 6]);
        assert_eq!(topology.shape(), vec![2, 3, 4]);
        assert_eq!(topology.num_processes(), 24);
        assert_eq!(topology.to_string(), "[2x3x4]");
    }

    #[test]
    fn test_find_topology() {
        let topologies = vec![grid(&[4, 6]), grid(&[6, 4]), grid(&[2, 3, 4]), grid(&[6, 4])];
        assert_eq!(find_topology(&grid(&[6, 4]), &topologies), Some(1));
        assert_eq!(find_topology(&grid(&[4, 6]), &topologies), Some(0));
        assert_eq!(find_topology(&grid(&[2, 3, 4]), &topologies), Some(2));
    }

    #[test]
    fn test_find_topology_not_found() {
        let topologies = vec![grid(&[4, 6]), grid(&[2, 3, 4])];
        // Permuted axes
        assert_eq!(find_topology(&grid(&[3, 2, 4]), &topologies), None);
        // Different extent
        assert_eq!(find_topology(&grid(&[4, 5]), &topologies), None);
        // Same leading extents, different ndim
        assert_eq!(find_topology(&grid(&[4]), &topologies), None);
        assert_eq!(find_topology(&grid(&[2, 3, 4, 1]), &topologies), None);
        assert_eq!(find_topology(&grid(&[2]), &[]), None);
    }

    #[test]
    fn test_from_shape() {
        let results = ThreadGroup::run(12, |world| {
            let topology = Topology::from_shape(&world, &[2, 3, 2]);
            let coordinates = topology.coordinates();
            // The axis groups contain the processes along the axis, ordered by coordinate
            let members = topology
                .axes()
                .iter()
                .map(|axis| axis.group().all_gather(&[world.rank() as f64]))
                .collect_vec();
            (topology.shape(), coordinates, members)
        });

        for (rank, (shape, coordinates, members)) in results.into_iter().enumerate() {
            assert_eq!(shape, vec![2, 3, 2]);
            assert_eq!(coordinates, vec![rank % 2, (rank / 2) % 3, rank / 6]);
            let lda = [1, 2, 6];
            for (axis, axis_members) in members.iter().enumerate() {
                let base = rank - coordinates[axis] * lda[axis];
                let expected = (0..axis_members.len())
                    .map(|c| (base + c * lda[axis]) as f64)
                    .collect_vec();
                assert_eq!(axis_members, &expected);
            }
        }
    }
}
