//! The latency accumulator shared by all workers of a run.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::meter::{Meter, Rates};
use crate::reservoir::{self, ExpDecayReservoir};

/// A builder for creating a [`LatencyHistogram`].
#[derive(Debug)]
pub struct HistogramBuilder {
    reservoir_size: usize,
    alpha: f64,
    seed: Option<u64>,
    start: Option<Instant>,
}

impl HistogramBuilder {
    /// The number of samples kept for percentile queries.
    pub fn reservoir_size(mut self, size: usize) -> Self {
        self.reservoir_size = size;
        self
    }

    /// How strongly the reservoir is biased towards recent samples.
    pub fn decay_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Seeds the reservoir's RNG for reproducible sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The instant that rates and sample decay are measured from. Defaults to now.
    pub fn start(mut self, start: Instant) -> Self {
        self.start = Some(start);
        self
    }

    /// Creates the histogram.
    pub fn build(self) -> LatencyHistogram {
        let start = self.start.unwrap_or_else(Instant::now);
        let seed = self.seed.unwrap_or_else(rand::random);

        LatencyHistogram {
            state: Mutex::new(State {
                moments: Moments::default(),
                reservoir: ExpDecayReservoir::new(self.reservoir_size, self.alpha, seed, start),
            }),
            meter: Meter::starting_at(start),
        }
    }
}

/// Running extrema and moments over every observation, using Welford's algorithm.
#[derive(Clone, Copy, Debug, Default)]
struct Moments {
    count: u64,
    min: Duration,
    max: Duration,
    /// Mean in nanoseconds.
    mean: f64,
    /// Sum of squared deviations from the mean, in nanoseconds squared.
    m2: f64,
}

impl Moments {
    fn push(&mut self, value: Duration) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.count += 1;
        let x = value.as_nanos() as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        nanos(self.mean).clamp(self.min, self.max)
    }

    fn stddev(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        nanos((self.m2 / self.count as f64).sqrt())
    }
}

#[derive(Debug)]
struct State {
    moments: Moments,
    reservoir: ExpDecayReservoir,
}

/// A concurrency-safe accumulator of request latencies.
///
/// Recording updates count, extrema and moments in constant time, offers the value to a bounded
/// [`ExpDecayReservoir`] and marks the throughput [`Meter`]. All updates commute, so the order in
/// which concurrent workers record does not affect the result.
///
/// Durations are recorded as-is. Validating them is the caller's concern.
#[derive(Debug)]
pub struct LatencyHistogram {
    state: Mutex<State>,
    meter: Meter,
}

impl LatencyHistogram {
    /// Creates a histogram with default reservoir settings, starting now.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Constructs a new histogram builder.
    pub fn builder() -> HistogramBuilder {
        HistogramBuilder {
            reservoir_size: reservoir::DEFAULT_SIZE,
            alpha: reservoir::DEFAULT_ALPHA,
            seed: None,
            start: None,
        }
    }

    /// Records a latency observed now.
    pub fn record(&self, latency: Duration) {
        self.record_at(latency, Instant::now());
    }

    /// Records a latency observed at `now`.
    pub fn record_at(&self, latency: Duration, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.moments.push(latency);
        state.reservoir.update(latency, now);
        // Marked under the lock so snapshots see the meter in step with the moments.
        self.meter.mark_at(1, now);
    }

    /// Returns the number of recorded latencies.
    pub fn count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .moments
            .count
    }

    /// Takes a consistent snapshot of all statistics as of now.
    pub fn snapshot(&self) -> HistogramSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Takes a consistent snapshot of all statistics as of `now`.
    ///
    /// The lock is only held to copy the moments, the reservoir and the rates; sorting happens
    /// afterwards.
    pub fn snapshot_at(&self, now: Instant) -> HistogramSnapshot {
        let (moments, mut sample, rates) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            (state.moments, state.reservoir.values(), self.meter.rates_at(now))
        };
        sample.sort_unstable();

        HistogramSnapshot {
            count: moments.count,
            min: moments.min,
            max: moments.max,
            mean: moments.mean(),
            stddev: moments.stddev(),
            rates,
            sample,
        }
    }

    /// Computes the given percentiles over a snapshot taken now.
    pub fn percentiles(&self, ps: &[f64]) -> Vec<Duration> {
        self.snapshot().percentiles(ps)
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable view of a [`LatencyHistogram`] at a single point in time.
///
/// All queries are deterministic: asking the same snapshot twice yields the same answer. An empty
/// snapshot reports zero for every value.
#[derive(Clone, Debug)]
pub struct HistogramSnapshot {
    count: u64,
    min: Duration,
    max: Duration,
    mean: Duration,
    stddev: Duration,
    rates: Rates,
    /// Reservoir contents in ascending order.
    sample: Vec<Duration>,
}

impl HistogramSnapshot {
    /// The number of recorded latencies.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The fastest recorded latency.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// The slowest recorded latency.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// The arithmetic mean of all recorded latencies.
    pub fn mean(&self) -> Duration {
        self.mean
    }

    /// The population standard deviation of all recorded latencies.
    pub fn stddev(&self) -> Duration {
        self.stddev
    }

    /// Throughput in recorded latencies per second.
    pub fn rates(&self) -> Rates {
        self.rates
    }

    /// The number of values percentiles are computed from.
    pub fn sample_len(&self) -> usize {
        self.sample.len()
    }

    /// Computes a single percentile, with `p` as a fraction in `[0, 1]`.
    ///
    /// The rank of `p` in a sample of `n` values is `p * (n + 1)`, counting from one. Ranks below
    /// the first or beyond the last value clamp to that value. Fractional ranks interpolate
    /// linearly between the two neighbouring values, and integral ranks hit a value exactly.
    pub fn percentile(&self, p: f64) -> Duration {
        let n = self.sample.len();
        if n == 0 {
            return Duration::ZERO;
        }

        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        let pos = p * (n + 1) as f64;
        if pos < 1.0 {
            return self.sample[0];
        }
        if pos >= n as f64 {
            return self.sample[n - 1];
        }

        let rank = pos.floor();
        let lower = self.sample[rank as usize - 1].as_nanos() as f64;
        let upper = self.sample[rank as usize].as_nanos() as f64;
        nanos(lower + (pos - rank) * (upper - lower))
    }

    /// Computes one percentile per requested fraction, in the same order.
    pub fn percentiles(&self, ps: &[f64]) -> Vec<Duration> {
        ps.iter().map(|&p| self.percentile(p)).collect()
    }
}

fn nanos(value: f64) -> Duration {
    Duration::from_nanos(value.round() as u64)
}
