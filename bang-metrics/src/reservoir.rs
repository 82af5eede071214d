//! Exponentially decaying reservoir sampling.
//!
//! Uses forward decay priority sampling: every value is assigned the priority
//! `exp(alpha * age) / u` with `u` drawn uniformly from `(0, 1]`, where `age` is measured from a
//! landmark. The reservoir keeps the values with the highest priorities, which biases the sample
//! towards recent observations. Priorities grow with the age of the landmark, so it is moved
//! forward every hour and all stored priorities are rescaled accordingly.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Default number of values kept in the reservoir.
///
/// This offers a 99.9% confidence level with a 5% margin of error assuming a normal distribution.
pub const DEFAULT_SIZE: usize = 1028;

/// Default decay factor, which heavily biases the sample towards the last five minutes.
pub const DEFAULT_ALPHA: f64 = 0.015;

const RESCALE_THRESHOLD: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug)]
struct Entry {
    priority: f64,
    value: Duration,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// A fixed-capacity sample of a stream of durations, biased towards recent values.
///
/// The backing storage is allocated once for the full capacity and never grows.
#[derive(Debug)]
pub struct ExpDecayReservoir {
    capacity: usize,
    alpha: f64,
    landmark: Instant,
    next_rescale: Instant,
    rng: SmallRng,
    /// Min-heap on priority, so the entry to evict is always on top.
    entries: BinaryHeap<Reverse<Entry>>,
}

impl ExpDecayReservoir {
    /// Creates an empty reservoir whose priorities are measured from `start`.
    pub fn new(capacity: usize, alpha: f64, seed: u64, start: Instant) -> Self {
        Self {
            capacity,
            alpha,
            landmark: start,
            next_rescale: start + RESCALE_THRESHOLD,
            rng: SmallRng::seed_from_u64(seed),
            entries: BinaryHeap::with_capacity(capacity),
        }
    }

    /// The maximum number of values kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of values currently kept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no value has been kept yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offers a value observed at `now` to the reservoir.
    pub fn update(&mut self, value: Duration, now: Instant) {
        if now >= self.next_rescale {
            self.rescale(now);
        }
        if self.capacity == 0 {
            return;
        }

        let age = now.saturating_duration_since(self.landmark).as_secs_f64();
        let u = 1.0 - self.rng.random::<f64>();
        let entry = Entry {
            priority: (self.alpha * age).exp() / u,
            value,
        };

        if self.entries.len() < self.capacity {
            self.entries.push(Reverse(entry));
        } else if let Some(Reverse(lowest)) = self.entries.peek()
            && entry.priority > lowest.priority
        {
            self.entries.pop();
            self.entries.push(Reverse(entry));
        }
    }

    /// Returns a copy of the kept values in no particular order.
    pub fn values(&self) -> Vec<Duration> {
        self.entries.iter().map(|Reverse(entry)| entry.value).collect()
    }

    fn rescale(&mut self, now: Instant) {
        let age = now.saturating_duration_since(self.landmark).as_secs_f64();
        let factor = (-self.alpha * age).exp();
        self.landmark = now;
        self.next_rescale = now + RESCALE_THRESHOLD;

        let mut entries = std::mem::take(&mut self.entries).into_vec();
        for Reverse(entry) in &mut entries {
            entry.priority *= factor;
        }
        self.entries = BinaryHeap::from(entries);
    }
}
