use std::env;
use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{LogFormat, Logging};

/// Installs the global tracing subscriber writing to stderr.
pub fn initialize_tracing(logging: &Logging) {
    let format = match logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Simplified => layer.with_ansi(false).boxed(),
        LogFormat::Pretty | LogFormat::Auto => layer.compact().boxed(),
    };

    let (level, env_filter) = parse_rust_log(logging.level);
    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .init();
}

/// Resolves the effective log level and the per-crate filter.
///
/// If `RUST_LOG` holds a plain level, it replaces the configured `default`. Any other value is used
/// verbatim as filter directives.
pub fn parse_rust_log(default: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => default,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        bang=TRACE,\
        bang_runner=TRACE,\
        bang_metrics=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_without_rust_log() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();

            let (level, _) = parse_rust_log(LevelFilter::WARN);
            assert_eq!(level, LevelFilter::WARN);

            Ok(())
        });
    }

    #[test]
    fn rust_log_level_overrides_config() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(EnvFilter::DEFAULT_ENV, "debug");

            let (level, _) = parse_rust_log(LevelFilter::WARN);
            assert_eq!(level, LevelFilter::DEBUG);

            Ok(())
        });
    }

    #[test]
    fn rust_log_directives_are_used_verbatim() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(EnvFilter::DEFAULT_ENV, "bang_runner::pool=debug");

            let (level, filter) = parse_rust_log(LevelFilter::WARN);
            assert_eq!(level, LevelFilter::TRACE);
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

            Ok(())
        });
    }
}
