//! Configuration for a load generation run.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `BANG__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `BANG__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `BANG__URL=http://localhost:8080/` sets the target URL
//! - `BANG__CONCURRENCY=50` runs fifty workers
//! - `BANG__LOGGING__LEVEL=debug` enables debug logs
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! url: http://localhost:8080/
//! concurrency: 50
//!
//! logging:
//!   level: debug
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::ConfigError;
use crate::pool::Termination;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "BANG__";

/// Free-text settings, which are read verbatim from the environment.
///
/// Other environment values are parsed, so `BANG__BODY=12345` would otherwise be read as a number.
const TEXT_SETTINGS: [&str; 4] = ["url", "method", "content_type", "body"];

/// Newtype around `String` that protects against accidental logging of credentials. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// What to do when a request fails at the transport level.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the whole run on the first failed request.
    ///
    /// A target that cannot be reached produces meaningless statistics, so this is the default.
    #[default]
    FailFast,

    /// Count the failure, drop the sample and keep going.
    Continue,
}

/// Runtime configuration.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
pub struct Runtime {
    /// Number of worker threads of the tokio runtime driving all load workers.
    ///
    /// # Default
    ///
    /// The number of available CPU cores.
    ///
    /// # Environment Variable
    ///
    /// `BANG__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  bang_runner::pool > starting 10 workers
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z [bang_runner::pool] INFO: starting 10 workers
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, so they never interleave with the report on stdout.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `BANG__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `BANG__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for a run.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// The URL to send requests to.
    ///
    /// There is no default; a run without a URL fails before any request is sent.
    ///
    /// # Environment Variable
    ///
    /// `BANG__URL`
    pub url: Option<String>,

    /// Number of workers sending requests concurrently.
    ///
    /// # Default
    ///
    /// `10`
    pub concurrency: usize,

    /// How long to keep sending requests when [`requests`](Self::requests) is `0`.
    ///
    /// Accepts human readable durations such as `10s`, `1m30s` or `500ms`.
    ///
    /// # Default
    ///
    /// `10s`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Number of requests each worker sends.
    ///
    /// Any value greater than `0` switches from a timed run to a counted run of exactly
    /// `concurrency * requests` requests.
    ///
    /// # Default
    ///
    /// `0`
    pub requests: u64,

    /// HTTP method of every request.
    ///
    /// # Default
    ///
    /// `GET`
    pub method: String,

    /// Value of the `Content-Type` request header.
    ///
    /// # Default
    ///
    /// `text/plain`
    pub content_type: String,

    /// Request body sent with every request.
    ///
    /// # Default
    ///
    /// Empty
    pub body: String,

    /// Basic auth credentials as `user:password`. Redacted from logs.
    ///
    /// # Environment Variable
    ///
    /// `BANG__AUTH`
    pub auth: Option<SecretBox<ConfigSecret>>,

    /// Maximum time a single request may take before it counts as failed.
    ///
    /// # Default
    ///
    /// `None` (requests may take arbitrarily long)
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// What to do when a request fails. See [`ErrorPolicy`].
    ///
    /// # Default
    ///
    /// `fail-fast`
    pub on_error: ErrorPolicy,

    /// Configuration of the async runtime.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            concurrency: 10,
            duration: Duration::from_secs(10),
            requests: 0,
            method: "GET".to_owned(),
            content_type: "text/plain".to_owned(),
            body: String::new(),
            auth: None,
            timeout: None,
            on_error: ErrorPolicy::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
        }
    }
}

/// Values given on the command line, which take precedence over all other sources.
///
/// Only fields that are `Some` override the configuration.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorPolicy>,
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if a path is given)
    /// 3. Environment variables (prefixed with `BANG__`)
    /// 4. Command line overrides
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file does not exist, cannot be read or cannot be parsed
    /// - Environment variables or overrides contain invalid values, such as an unparsable duration
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            anyhow::ensure!(path.is_file(), "config file {} does not exist", path.display());
            figment = figment.merge(Yaml::file(path));
        }
        let env = Env::prefixed(ENV_PREFIX).split("__");
        let text: BTreeMap<String, String> = env
            .iter()
            .filter(|(key, _)| TEXT_SETTINGS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str().to_owned(), value))
            .collect();
        let config = figment
            .merge(env.ignore(&TEXT_SETTINGS))
            .merge(Serialized::defaults(text))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        Ok(config)
    }

    /// Checks settings that cannot be expressed in their types.
    ///
    /// Request settings are validated when building the
    /// [`RequestTemplate`](crate::request::RequestTemplate).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.runtime.worker_threads == 0 {
            return Err(ConfigError::ZeroWorkerThreads);
        }
        Ok(())
    }

    /// Returns the termination policy selected by this configuration.
    pub fn termination(&self) -> Termination {
        if self.requests > 0 {
            Termination::Count(self.requests)
        } else {
            Termination::Duration(self.duration)
        }
    }
}
