//! Blocking collective operations over a group of cooperating processes.
//!
//! Everything in this crate that needs more than one rank talks to its peers
//! through the [`Collective`] trait. Two back ends exist: [`threaded::ThreadGroup`]
//! simulates ranks as threads of a single process, and (with the `mpi` feature)
//! [`mpi::topology::SimpleCommunicator`] runs them as real MPI processes.
//!
//! All operations are blocking and must be called by every member of the group in
//! the same order. A rank that skips a call deadlocks the group; a failing call
//! aborts the calling rank.

#[cfg(feature = "mpi")]
mod mpi_backend;
#[cfg(all(test, feature = "mpi"))]
pub(crate) mod testing;
pub mod threaded;

/// A process group that supports the blocking collectives used for folding and
/// tuning.
pub trait Collective {
    /// The rank of the calling process inside this group.
    fn rank(&self) -> usize;

    /// The number of processes in this group.
    fn size(&self) -> usize;

    /// Sums `value` over all ranks. Every rank receives the result.
    fn all_reduce_sum(&self, value: u64) -> u64;

    /// Takes the maximum of `value` over all ranks. Every rank receives the result.
    fn all_reduce_max(&self, value: f64) -> f64;

    /// Concatenates the `local` slices of all ranks in rank order. All ranks must
    /// pass slices of equal length.
    fn all_gather(&self, local: &[f64]) -> Vec<f64>;

    /// Overwrites `data` on every rank with the contents of `data` on `root`.
    fn broadcast(&self, root: usize, data: &mut [f64]);

    /// Splits the group. Ranks passing the same `color` end up in the same new
    /// group, ordered by `key` (ties broken by the rank in this group).
    fn split(&self, color: usize, key: usize) -> Self
    where
        Self: Sized;
}
