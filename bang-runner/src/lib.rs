//! A concurrent HTTP load generator.
//!
//! `bang` sends the same request from many concurrent workers, either for a fixed duration or a
//! fixed number of times per worker, and reports latency and throughput statistics afterwards.
//!
//! The building blocks are usable on their own:
//!
//!  - [`RequestTemplate`](request::RequestTemplate) describes the request to send.
//!  - An [`Executor`](executor::Executor) sends it once and measures the latency.
//!  - The [`WorkerPool`](pool::WorkerPool) drives an executor concurrently and collects the
//!    latencies into a [`LatencyHistogram`](bang_metrics::LatencyHistogram).
//!  - [`Summary`](report::Summary) renders the final report.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod observability;
pub mod pool;
pub mod report;
pub mod request;
