//! Streaming latency statistics for the `bang` load generator.
//!
//! The central type is the [`LatencyHistogram`], a concurrency-safe accumulator which is shared by
//! all workers of a run. It keeps running extrema and moments for every observation, a bounded
//! [`ExpDecayReservoir`] to answer percentile queries, and a [`Meter`] tracking throughput as
//! exponentially weighted moving averages.
//!
//! Reads go through an immutable [`HistogramSnapshot`], so reporting never blocks writers for
//! longer than it takes to copy the reservoir.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod histogram;
pub mod meter;
pub mod reservoir;

pub use crate::histogram::{HistogramBuilder, HistogramSnapshot, LatencyHistogram};
pub use crate::meter::{Ewma, Meter, Rates, TICK_INTERVAL};
pub use crate::reservoir::ExpDecayReservoir;
