//! Renders the summary printed after a run.

use std::fmt;
use std::time::Duration;

use bang_metrics::HistogramSnapshot;

use crate::pool::RunReport;

/// Percentiles included in the summary, in report order.
pub const PERCENTILES: [(f64, &str); 5] = [
    (0.5, "Median"),
    (0.75, "75th percentile"),
    (0.95, "95th percentile"),
    (0.99, "99th percentile"),
    (0.999, "99.9th percentile"),
];

/// A plain-text summary of a histogram snapshot.
///
/// Every line holds a label padded to 18 columns, two tabs, and a right-aligned value. Latencies
/// are printed in seconds with two decimals, rates in requests per second.
#[derive(Debug)]
pub struct Summary<'a> {
    snapshot: &'a HistogramSnapshot,
    failures: u64,
    elapsed: Option<Duration>,
}

impl<'a> Summary<'a> {
    /// Creates a summary of the statistics alone.
    pub fn new(snapshot: &'a HistogramSnapshot) -> Self {
        Self {
            snapshot,
            failures: 0,
            elapsed: None,
        }
    }

    /// Adds a line with the number of failed requests, if there were any.
    pub fn failures(mut self, failures: u64) -> Self {
        self.failures = failures;
        self
    }

    /// Adds a trailing line with the total duration of the run.
    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

impl<'a> From<&'a RunReport> for Summary<'a> {
    fn from(report: &'a RunReport) -> Self {
        Summary::new(&report.snapshot)
            .failures(report.failures)
            .elapsed(report.elapsed)
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot;

        writeln!(f, "{:<18}\t\t {:>9}", "Successful calls", snapshot.count())?;
        if self.failures > 0 {
            writeln!(f, "{:<18}\t\t {:>9}", "Failed calls", self.failures)?;
        }

        seconds(f, "Fastest", snapshot.min())?;
        seconds(f, "Slowest", snapshot.max())?;
        seconds(f, "Mean", snapshot.mean())?;
        seconds(f, "Standard deviation", snapshot.stddev())?;

        let ps = PERCENTILES.map(|(p, _)| p);
        let values = snapshot.percentiles(&ps);
        for ((_, label), value) in PERCENTILES.iter().zip(values) {
            seconds(f, label, value)?;
        }

        let rates = snapshot.rates();
        rate(f, "Mean rate", rates.mean)?;
        rate(f, "1-min rate", rates.one_minute)?;
        rate(f, "5-min rate", rates.five_minutes)?;
        rate(f, "15-min rate", rates.fifteen_minutes)?;

        if let Some(elapsed) = self.elapsed {
            seconds(f, "Total time", elapsed)?;
        }

        Ok(())
    }
}

fn seconds(f: &mut fmt::Formatter<'_>, label: &str, value: Duration) -> fmt::Result {
    writeln!(f, "{label:<18}\t\t {:>12.2}s", value.as_secs_f64())
}

fn rate(f: &mut fmt::Formatter<'_>, label: &str, value: f64) -> fmt::Result {
    writeln!(f, "{label:<18}\t\t {value:>12.2}")
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use bang_metrics::LatencyHistogram;

    use super::*;

    fn snapshot(values_ms: &[u64]) -> HistogramSnapshot {
        let start = Instant::now();
        let histogram = LatencyHistogram::builder().start(start).seed(1).build();
        for ms in values_ms {
            histogram.record_at(Duration::from_millis(*ms), start);
        }
        histogram.snapshot_at(start + Duration::from_secs(2))
    }

    #[test]
    fn renders_all_statistics() {
        let snapshot = snapshot(&[100, 200, 400, 800, 1600]);

        // mean = 3.1s / 5; population stddev = sqrt(1.488 / 5); p75 at rank 4.5
        let expected = "\
Successful calls  \t\t         5
Fastest           \t\t         0.10s
Slowest           \t\t         1.60s
Mean              \t\t         0.62s
Standard deviation\t\t         0.55s
Median            \t\t         0.40s
75th percentile   \t\t         1.20s
95th percentile   \t\t         1.60s
99th percentile   \t\t         1.60s
99.9th percentile \t\t         1.60s
Mean rate         \t\t         2.50
1-min rate        \t\t         2.50
5-min rate        \t\t         2.50
15-min rate       \t\t         2.50
";
        assert_eq!(Summary::new(&snapshot).to_string(), expected);
    }

    #[test]
    fn empty_snapshot_renders_zeros() {
        let snapshot = snapshot(&[]);
        let rendered = Summary::new(&snapshot).to_string();

        assert!(rendered.starts_with("Successful calls  \t\t         0\n"));
        assert!(rendered.contains("Median            \t\t         0.00s\n"));
        assert!(rendered.ends_with("15-min rate       \t\t         0.00\n"));
    }

    #[test]
    fn failures_only_when_present() {
        let snapshot = snapshot(&[10]);

        let rendered = Summary::new(&snapshot).failures(0).to_string();
        assert!(!rendered.contains("Failed calls"));

        let rendered = Summary::new(&snapshot).failures(3).to_string();
        assert!(rendered.contains("Successful calls  \t\t         1\nFailed calls      \t\t         3\n"));
    }

    #[test]
    fn report_adds_total_time() {
        let report = RunReport {
            snapshot: snapshot(&[10, 20]),
            elapsed: Duration::from_millis(10_250),
            failures: 0,
        };

        let rendered = Summary::from(&report).to_string();
        assert_eq!(rendered.lines().count(), 15);
        assert!(rendered.ends_with("Total time        \t\t        10.25s\n"));
    }
}
