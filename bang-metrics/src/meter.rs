//! Throughput tracking with exponentially weighted moving averages.
//!
//! A [`Meter`] counts events and maintains 1, 5 and 15 minute [`Ewma`] rates. Marked events land
//! in an atomic accumulator which is drained once per [`TICK_INTERVAL`]. Ticks are applied lazily
//! on fixed boundaries measured from the meter's start, so the reported rates only depend on when
//! events happened and not on when the rates are queried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Interval at which the moving averages are updated.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

const TICK_NANOS: u64 = TICK_INTERVAL.as_nanos() as u64;

/// An exponentially weighted moving average of an event rate, in events per second.
///
/// Every [tick](Self::tick) folds the events counted during the last [`TICK_INTERVAL`] into the
/// average: `rate = rate * decay + instant * (1 - decay)` with `decay = exp(-tick / window)`.
#[derive(Clone, Debug)]
pub struct Ewma {
    decay: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    /// Creates an average that decays over the given window.
    pub fn new(window: Duration) -> Self {
        let decay = (-TICK_INTERVAL.as_secs_f64() / window.as_secs_f64()).exp();
        Self {
            decay,
            rate: 0.0,
            initialized: false,
        }
    }

    /// A one minute moving average.
    pub fn one_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// A five minute moving average.
    pub fn five_minutes() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }

    /// A fifteen minute moving average.
    pub fn fifteen_minutes() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }

    /// Folds the number of events seen during the last tick interval into the average.
    ///
    /// The first tick seeds the average with the instant rate instead of decaying from zero.
    pub fn tick(&mut self, count: u64) {
        let instant = count as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate = self.rate * self.decay + instant * (1.0 - self.decay);
        } else {
            self.rate = instant;
            self.initialized = true;
        }
    }

    /// Returns the current rate, or `None` if no tick has happened yet.
    pub fn rate(&self) -> Option<f64> {
        self.initialized.then_some(self.rate)
    }
}

/// Event rates in events per second.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rates {
    /// Total events divided by the time since the meter started.
    pub mean: f64,
    /// One minute moving average.
    pub one_minute: f64,
    /// Five minute moving average.
    pub five_minutes: f64,
    /// Fifteen minute moving average.
    pub fifteen_minutes: f64,
}

/// Counts events and tracks their rate.
///
/// Marking is lock-free unless a tick boundary has passed since the last tick. Before the first
/// tick, all moving averages report the mean rate, so a short run never reports a rate of zero.
#[derive(Debug)]
pub struct Meter {
    start: Instant,
    count: AtomicU64,
    /// Events marked since the last tick.
    uncounted: AtomicU64,
    /// Nanoseconds from `start` to the last tick boundary. Only written while holding `averages`.
    last_tick: AtomicU64,
    averages: Mutex<[Ewma; 3]>,
}

impl Meter {
    /// Creates a meter starting now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a meter whose first tick interval begins at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            count: AtomicU64::new(0),
            uncounted: AtomicU64::new(0),
            last_tick: AtomicU64::new(0),
            averages: Mutex::new([
                Ewma::one_minute(),
                Ewma::five_minutes(),
                Ewma::fifteen_minutes(),
            ]),
        }
    }

    /// Marks `n` events as happening now.
    pub fn mark(&self, n: u64) {
        self.mark_at(n, Instant::now());
    }

    /// Marks `n` events as happening at `now`.
    pub fn mark_at(&self, n: u64, now: Instant) {
        self.tick_if_necessary(now);
        self.uncounted.fetch_add(n, Ordering::Relaxed);
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Returns the total number of marked events.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the rates as they would be observed at `now`.
    ///
    /// Pending ticks are applied to a copy of the averages, so this does not modify the meter.
    pub fn rates_at(&self, now: Instant) -> Rates {
        let count = self.count.load(Ordering::Relaxed);
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let mean = if elapsed > 0.0 {
            count as f64 / elapsed
        } else {
            0.0
        };

        let averages = {
            let guard = self.averages.lock().unwrap_or_else(PoisonError::into_inner);
            let ticks = self.pending_ticks(now);
            let mut averages = (*guard).clone();
            if ticks > 0 {
                let uncounted = self.uncounted.load(Ordering::Relaxed);
                advance(&mut averages, uncounted, ticks);
            }
            averages
        };

        let [one, five, fifteen] = &averages;
        Rates {
            mean,
            one_minute: one.rate().unwrap_or(mean),
            five_minutes: five.rate().unwrap_or(mean),
            fifteen_minutes: fifteen.rate().unwrap_or(mean),
        }
    }

    fn tick_if_necessary(&self, now: Instant) {
        if self.pending_ticks(now) == 0 {
            return;
        }

        let mut averages = self.averages.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have ticked while we were waiting for the lock.
        let ticks = self.pending_ticks(now);
        if ticks == 0 {
            return;
        }

        let uncounted = self.uncounted.swap(0, Ordering::Relaxed);
        advance(&mut averages, uncounted, ticks);
        self.last_tick.fetch_add(ticks * TICK_NANOS, Ordering::Release);
    }

    fn pending_ticks(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start).as_nanos() as u64;
        let last = self.last_tick.load(Ordering::Acquire);
        elapsed.saturating_sub(last) / TICK_NANOS
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies `ticks` ticks, attributing all `uncounted` events to the first one.
fn advance(averages: &mut [Ewma; 3], uncounted: u64, ticks: u64) {
    for ewma in averages.iter_mut() {
        ewma.tick(uncounted);
        for _ in 1..ticks {
            ewma.tick(0);
        }
    }
}
