use tracing_subscriber::EnvFilter;

/// Crates whose logs show up in test output.
const CRATE_NAMES: &[&str] = &["bang", "bang_runner", "bang_metrics"];

/// Installs a test-friendly subscriber, once per test binary.
///
/// Output goes through the test runner's capture, so it only shows for failing tests. `RUST_LOG`
/// takes precedence. Otherwise the load generator's crates log at every level and everything else
/// only logs errors.
///
/// # Example
///
/// ```
/// bang_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = CRATE_NAMES.iter().map(|name| format!("{name}=trace"));
        let filter = std::iter::once("error".to_owned())
            .chain(directives)
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(filter)
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init()
        .ok();
}
