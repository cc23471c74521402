use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use itertools::Itertools;
use log::trace;

use crate::collective::Collective;

/// A single contribution of one rank to a collective exchange.
#[derive(Debug, Clone)]
enum Message {
    Count(u64),
    Values(Vec<f64>),
    Split { color: usize, key: usize },
    Group(Option<Arc<Exchange>>),
}

/// How often a rank blocked in a collective checks whether the run was aborted.
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Unwind payload of ranks that stop because a peer panicked.
struct PeerPanicked;

#[derive(Debug, Default)]
struct Rendezvous {
    arrived: usize,
    generation: u64,
}

/// The shared state of one simulated group: a mailbox slot per rank and a barrier
/// that keeps the ranks in lockstep.
///
/// `aborted` is shared by all groups split off the same run. Once set, every rank
/// waiting in a barrier unwinds instead of waiting for peers that will never come.
#[derive(Debug)]
struct Exchange {
    size: usize,
    slots: Mutex<Vec<Option<Message>>>,
    rendezvous: Mutex<Rendezvous>,
    released: Condvar,
    aborted: Arc<AtomicBool>,
}

impl Exchange {
    fn new(size: usize, aborted: Arc<AtomicBool>) -> Self {
        Self {
            size,
            slots: Mutex::new(vec![None; size]),
            rendezvous: Mutex::new(Rendezvous::default()),
            released: Condvar::new(),
            aborted,
        }
    }

    /// Blocks until all ranks of the group arrived, like [`std::sync::Barrier`].
    ///
    /// # Panics
    /// Unwinds if any rank of the run panicked.
    fn wait(&self) {
        let mut state = self.rendezvous.lock().unwrap();
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return;
        }
        while state.generation == generation {
            if self.aborted.load(Ordering::Acquire) {
                drop(state);
                panic::resume_unwind(Box::new(PeerPanicked));
            }
            state = self
                .released
                .wait_timeout(state, ABORT_POLL_INTERVAL)
                .unwrap()
                .0;
        }
    }
}

/// A group of simulated ranks, each running on its own thread within the current
/// process.
///
/// Every collective is implemented as an all-to-all exchange: each rank deposits its
/// contribution, waits for all peers, reads every contribution, and waits again
/// before the slots may be reused. This mirrors the synchronization semantics of
/// blocking MPI collectives closely enough to test the lockstep protocols of this
/// crate without an MPI installation.
///
/// # Examples
/// ```
/// # use tncplan::collective::Collective;
/// # use tncplan::collective::threaded::ThreadGroup;
/// let sums = ThreadGroup::run(4, |group| group.all_reduce_sum(group.rank() as u64));
/// assert_eq!(sums, vec![6, 6, 6, 6]);
/// ```
#[derive(Debug, Clone)]
pub struct ThreadGroup {
    rank: usize,
    size: usize,
    shared: Arc<Exchange>,
}

impl ThreadGroup {
    /// Runs `task` on `size` simulated ranks, each on its own scoped thread, and
    /// returns the results in rank order.
    ///
    /// A panic on one rank aborts the whole run, like `MPI_Abort`: peers blocked in
    /// a collective stop waiting and unwind as well.
    ///
    /// # Panics
    /// Re-raises the panic that caused the abort.
    pub fn run<F, T>(size: usize, task: F) -> Vec<T>
    where
        F: Fn(ThreadGroup) -> T + Sync,
        T: Send,
    {
        assert!(size > 0, "a group needs at least one rank");
        let aborted = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Exchange::new(size, Arc::clone(&aborted)));
        let task = &task;
        let outcomes = thread::scope(|scope| {
            let handles = (0..size)
                .map(|rank| {
                    let group = ThreadGroup {
                        rank,
                        size,
                        shared: Arc::clone(&shared),
                    };
                    let aborted = &aborted;
                    scope.spawn(move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(group)));
                        if outcome.is_err() {
                            aborted.store(true, Ordering::Release);
                        }
                        outcome
                    })
                })
                .collect_vec();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(Err))
                .collect_vec()
        });

        let (results, panics): (Vec<_>, Vec<_>) = outcomes.into_iter().partition_result();
        if panics.is_empty() {
            return results;
        }
        panic::resume_unwind(first_cause(panics))
    }

    /// Deposits `message` and returns the messages of all ranks in rank order.
    fn exchange(&self, message: Message) -> Vec<Message> {
        self.shared.slots.lock().unwrap()[self.rank] = Some(message);
        self.shared.wait();
        let messages = self
            .shared
            .slots
            .lock()
            .unwrap()
            .iter()
            .map(|slot| slot.clone().expect("every rank deposits before the barrier"))
            .collect_vec();
        self.shared.wait();
        messages
    }

    fn exchange_values(&self, values: Vec<f64>) -> Vec<Vec<f64>> {
        self.exchange(Message::Values(values))
            .into_iter()
            .map(|message| match message {
                Message::Values(values) => values,
                other => panic!("collective mismatch: expected values, got {other:?}"),
            })
            .collect()
    }
}

/// Picks the panic that caused the abort over the ones of peers that merely
/// followed it.
fn first_cause(mut panics: Vec<Box<dyn Any + Send>>) -> Box<dyn Any + Send> {
    let cause = panics
        .iter()
        .position(|payload| !payload.is::<PeerPanicked>())
        .unwrap_or(0);
    panics.swap_remove(cause)
}

impl Collective for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, value: u64) -> u64 {
        self.exchange(Message::Count(value))
            .into_iter()
            .map(|message| match message {
                Message::Count(count) => count,
                other => panic!("collective mismatch: expected count, got {other:?}"),
            })
            .sum()
    }

    fn all_reduce_max(&self, value: f64) -> f64 {
        self.exchange_values(vec![value])
            .into_iter()
            .flatten()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn all_gather(&self, local: &[f64]) -> Vec<f64> {
        let gathered = self.exchange_values(local.to_vec());
        assert!(
            gathered.iter().all(|part| part.len() == local.len()),
            "all ranks must contribute the same number of elements"
        );
        gathered.concat()
    }

    fn broadcast(&self, root: usize, data: &mut [f64]) {
        let contribution = if self.rank == root {
            data.to_vec()
        } else {
            Vec::new()
        };
        let mut gathered = self.exchange_values(contribution);
        let received = std::mem::take(&mut gathered[root]);
        assert_eq!(
            received.len(),
            data.len(),
            "broadcast buffer length differs from the root's"
        );
        data.copy_from_slice(&received);
    }

    fn split(&self, color: usize, key: usize) -> Self {
        let requests = self
            .exchange(Message::Split { color, key })
            .into_iter()
            .map(|message| match message {
                Message::Split { color, key } => (color, key),
                other => panic!("collective mismatch: expected split, got {other:?}"),
            })
            .collect_vec();

        // Members of the new group, ordered by (key, old rank)
        let members = requests
            .iter()
            .enumerate()
            .filter(|(_, (c, _))| *c == color)
            .sorted_by_key(|(rank, (_, k))| (*k, *rank))
            .map(|(rank, _)| rank)
            .collect_vec();
        let new_rank = members
            .iter()
            .position(|&rank| rank == self.rank)
            .expect("the calling rank is part of its own color");
        let leader = members[0];

        // The leader of each new group allocates the shared state and hands it out
        let offer = (new_rank == 0)
            .then(|| Arc::new(Exchange::new(members.len(), Arc::clone(&self.shared.aborted))));
        let offers = self.exchange(Message::Group(offer));
        let Message::Group(Some(shared)) = &offers[leader] else {
            panic!("group leader {leader} did not provide the shared group state");
        };
        trace!(color, key, old_rank = self.rank, new_rank; "Split simulated group");

        Self {
            rank: new_rank,
            size: members.len(),
            shared: Arc::clone(shared),
        }
    }
}
