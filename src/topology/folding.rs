//! Folding of process grids: merging two adjacent axes into one.

use log::debug;

use crate::collective::Collective;
use crate::topology::{AxisComm, Topology};

/// The position of a process inside the group obtained by merging the adjacent axes
/// `i` and `j = i + 1`.
///
/// `color` identifies the new group: it is the global rank with the coordinates
/// along both merged axes zeroed, so it is shared by exactly the processes that
/// agree on every other axis. `merged_rank` is the rank inside the new group, with
/// axis `j` as the slow and axis `i` as the fast index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FoldPosition {
    pub color: usize,
    pub merged_rank: usize,
}

impl FoldPosition {
    /// Recovers the global rank from the position.
    ///
    /// # Examples
    /// ```
    /// # use tncplan::topology::folding::fold_position;
    /// // Grid [2, 3, 4], process at coordinates (1, 2, 3)
    /// let global_rank = 1 + 2 * 2 + 3 * 6;
    /// let position = fold_position(global_rank, (1, 1, 2), (2, 2));
    /// assert_eq!(position.merged_rank, 5);
    /// assert_eq!(position.global_rank(1), global_rank);
    /// ```
    #[inline]
    pub fn global_rank(&self, lda_i: usize) -> usize {
        self.color + self.merged_rank * lda_i
    }
}

/// Computes the [`FoldPosition`] of the process with `global_rank` when folding the
/// axes `i` and `j`. `axis_i` and `axis_j` are the `(rank, lda, size)` triples of the
/// process on the respective axis; only the rank and stride of `j` matter.
#[inline]
pub fn fold_position(
    global_rank: usize,
    (rank_i, lda_i, size_i): (usize, usize, usize),
    (rank_j, lda_j): (usize, usize),
) -> FoldPosition {
    FoldPosition {
        color: global_rank - rank_i * lda_i - rank_j * lda_j,
        merged_rank: rank_j * size_i + rank_i,
    }
}

/// Folds `grid` into every grid with one dimension less that results from merging
/// a pair of adjacent axes. Each new grid is handed to `register`, which decides
/// whether to keep it and returns its index in the caller's registry (see
/// [`TopologyRegistry::register`](crate::topology::registry::TopologyRegistry::register)).
/// Returns the indices in the order of the folded axis pairs.
///
/// Only adjacent axes are merged. Grids with at most one axis are not folded.
/// This is a collective operation over `global`, which must be the group the grid
/// was built from.
///
/// # Panics
/// Panics if splitting `global` yields a group that does not have exactly the
/// combined size of the merged axes.
pub fn fold_torus<C, F>(grid: &Topology<C>, global: &C, mut register: F) -> Vec<usize>
where
    C: Collective,
    F: FnMut(Topology<C>) -> usize,
{
    let ndim = grid.ndim();
    if ndim <= 1 {
        return Vec::new();
    }

    let global_rank = global.rank();
    let mut indices = Vec::with_capacity(ndim - 1);
    for i in 0..ndim - 1 {
        let j = i + 1;
        let (axis_i, axis_j) = (grid.axis(i), grid.axis(j));
        let position = fold_position(
            global_rank,
            (axis_i.rank(), grid.lda()[i], axis_i.size()),
            (axis_j.rank(), grid.lda()[j]),
        );
        let merged_size = axis_i.size() * axis_j.size();

        let merged = global.split(position.color, position.merged_rank);
        assert_eq!(
            merged.size(),
            merged_size,
            "folding axes {i} and {j} of {grid} produced a group of the wrong size"
        );
        assert_eq!(merged.rank(), position.merged_rank);

        let mut axes = Vec::with_capacity(ndim - 1);
        axes.extend(grid.axes()[..i].iter().cloned());
        axes.push(AxisComm::new(merged));
        axes.extend(grid.axes()[j + 1..].iter().cloned());
        let folded = Topology::new(axes);
        debug!(i, j, folded:%; "Folded topology");

        indices.push(register(folded));
    }
    indices
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;

    use super::*;

    use crate::collective::threaded::ThreadGroup;
    use crate::topology::registry::TopologyRegistry;

    /// Coordinates of `global_rank` on a row-major grid with the given `shape`.
    fn coordinates(global_rank: usize, shape: &[usize]) -> Vec<usize> {
        let mut rest = global_rank;
        shape
            .iter()
            .map(|&size| {
                let coordinate = rest % size;
                rest /= size;
                coordinate
            })
            .collect()
    }

    fn strides(shape: &[usize]) -> Vec<usize> {
        shape
            .iter()
            .scan(1, |stride, &size| {
                let current = *stride;
                *stride *= size;
                Some(current)
            })
            .collect()
    }

    fn assert_bijective_fold(shape: &[usize], i: usize) {
        let j = i + 1;
        let lda = strides(shape);
        let total = shape.iter().product::<usize>();
        let merged_size = shape[i] * shape[j];

        let mut seen = FxHashSet::default();
        let mut colors = FxHashSet::default();
        for global_rank in 0..total {
            let c = coordinates(global_rank, shape);
            let position = fold_position(global_rank, (c[i], lda[i], shape[i]), (c[j], lda[j]));
            assert!(position.merged_rank < merged_size);
            assert!(seen.insert(position), "{position:?} reached twice");
            assert_eq!(position.global_rank(lda[i]), global_rank);

            // The color only depends on the other coordinates
            let mut other = c.clone();
            other[i] = 0;
            other[j] = 0;
            let expected_color = other.iter().zip(&lda).map(|(c, l)| c * l).sum::<usize>();
            assert_eq!(position.color, expected_color);
            colors.insert(position.color);
        }
        assert_eq!(seen.len(), total);
        assert_eq!(colors.len(), total / merged_size);
    }

    #[test]
    fn test_fold_position_bijective() {
        assert_bijective_fold(&[2, 3, 4], 0);
        assert_bijective_fold(&[2, 3, 4], 1);
        assert_bijective_fold(&[3, 1, 2, 2], 0);
        assert_bijective_fold(&[3, 1, 2, 2], 1);
        assert_bijective_fold(&[3, 1, 2, 2], 2);
        assert_bijective_fold(&[5, 7], 0);
    }

    #[test]
    fn test_fold_torus_2x3x4() {
        let results = ThreadGroup::run(24, |world| {
            let grid = Topology::from_shape(&world, &[2, 3, 4]);
            let mut registry = TopologyRegistry::default();
            let indices = fold_torus(&grid, &world, |topology| registry.register(topology));

            let folded = registry.iter().map(Topology::shape).collect::<Vec<_>>();
            let first = registry.get(0);
            // Processes in the merged group, in merged rank order
            let merged_members = first.axis(0).group().all_gather(&[world.rank() as f64]);
            (
                indices,
                folded,
                first.coordinates(),
                merged_members,
                grid.coordinates(),
            )
        });

        for (global_rank, (indices, folded, folded_coordinates, members, c)) in
            results.into_iter().enumerate()
        {
            assert_eq!(indices, vec![0, 1]);
            assert_eq!(folded, vec![vec![6, 4], vec![2, 12]]);
            assert_eq!(folded_coordinates, vec![c[1] * 2 + c[0], c[2]]);

            let color = global_rank - c[0] - c[1] * 2;
            let expected = (0..6).map(|m| (color + m) as f64).collect::<Vec<_>>();
            assert_eq!(members, expected);
        }
    }

    #[test]
    fn test_fold_torus_reuses_registered_shapes() {
        let results = ThreadGroup::run(8, |world| {
            let grid = Topology::from_shape(&world, &[2, 2, 2]);
            let mut registry = TopologyRegistry::default();
            registry.register(grid.clone());
            let first = fold_torus(&grid, &world, |topology| registry.register(topology));
            let second = fold_torus(&grid, &world, |topology| registry.register(topology));
            (first, second, registry.len())
        });
        for (first, second, len) in results {
            // [4, 2] and [2, 4] are distinct shapes
            assert_eq!(first, vec![1, 2]);
            assert_eq!(second, first);
            assert_eq!(len, 3);
        }
    }

    #[test]
    fn test_fold_torus_low_dimensional() {
        let results = ThreadGroup::run(3, |world| {
            let grid = Topology::from_shape(&world, &[3]);
            fold_torus(&grid, &world, |_| panic!("nothing to register"))
        });
        assert!(results.iter().all(Vec::is_empty));
    }
}
