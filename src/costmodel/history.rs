use crate::costmodel::Sample;

/// A fixed-capacity ring buffer keeping the most recent samples of a model.
///
/// The `k`-th observed sample is stored at slot `k mod capacity`, so once the
/// buffer is full, the oldest sample is overwritten first.
#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    samples: Vec<Sample>,
    observed: u64,
}

impl History {
    /// Creates an empty history holding up to `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
            observed: 0,
        }
    }

    /// Stores `sample`, overwriting the oldest one if the buffer is full.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            let slot = (self.observed % self.capacity as u64) as usize;
            self.samples[slot] = sample;
        }
        self.observed += 1;
    }

    /// The number of samples currently held, `min(observed, capacity)`.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The total number of samples ever pushed.
    #[inline]
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// The samples in storage order.
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// The samples from oldest to newest.
    pub fn chronological(&self) -> impl Iterator<Item = &Sample> + '_ {
        let start = if self.samples.len() < self.capacity {
            0
        } else {
            (self.observed % self.capacity as u64) as usize
        };
        let (newer, older) = self.samples.split_at(start);
        older.iter().chain(newer)
    }
}
