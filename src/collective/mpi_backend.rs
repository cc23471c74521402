use mpi::collective::SystemOperation;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::{Communicator, CommunicatorCollectives, Root};
use mpi::Rank;

use crate::collective::Collective;

/// Converts a rank, color or key to the integer type MPI expects.
fn to_rank(value: usize) -> Rank {
    Rank::try_from(value).unwrap()
}

impl Collective for SimpleCommunicator {
    fn rank(&self) -> usize {
        usize::try_from(Communicator::rank(self)).unwrap()
    }

    fn size(&self) -> usize {
        usize::try_from(Communicator::size(self)).unwrap()
    }

    fn all_reduce_sum(&self, value: u64) -> u64 {
        let mut total = 0u64;
        self.all_reduce_into(&value, &mut total, SystemOperation::sum());
        total
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        let mut max = 0f64;
        self.all_reduce_into(&value, &mut max, SystemOperation::max());
        max
    }

    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        let mut gathered = vec![0f64; local.len() * Collective::size(self)];
        self.all_gather_into(local, &mut gathered[..]);
        gathered
    }

    fn broadcast(&self, root: usize, data: &mut [f64]) {
        self.process_at_rank(to_rank(root)).broadcast_into(data);
    }

    fn split(&self, color: usize, key: usize) -> Self {
        self.split_by_color_with_key(Color::with_value(to_rank(color)), to_rank(key))
            .expect("communicator split returned no group for a defined color")
    }
}
