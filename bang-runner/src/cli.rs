use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use crate::config::{Config, ErrorPolicy, Overrides};
use crate::executor::HttpExecutor;
use crate::observability;
use crate::pool::WorkerPool;
use crate::report::Summary;
use crate::request::RequestTemplate;

/// Sends HTTP requests concurrently and reports latency statistics.
///
/// Runs for a fixed duration, or a fixed number of requests per worker if --requests is given.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// the URL to send requests to
    #[argh(option)]
    url: Option<String>,

    /// number of concurrent workers (default: 10)
    #[argh(option)]
    concurrency: Option<usize>,

    /// how long to send requests, such as "10s" or "1m 30s" (default: 10s)
    #[argh(option)]
    duration: Option<String>,

    /// number of requests per worker, overrides --duration if greater than zero
    #[argh(option)]
    requests: Option<u64>,

    /// the HTTP method (default: GET)
    #[argh(option)]
    method: Option<String>,

    /// the content type header (default: text/plain)
    #[argh(option)]
    content_type: Option<String>,

    /// the request body
    #[argh(option)]
    body: Option<String>,

    /// basic auth credentials as user:password
    #[argh(option)]
    auth: Option<String>,

    /// time limit for each request, such as "2s"
    #[argh(option)]
    timeout: Option<String>,

    /// keep sending requests after transport errors and report them as failed calls
    #[argh(switch)]
    keep_going: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            concurrency: self.concurrency,
            duration: self.duration.clone(),
            requests: self.requests,
            method: self.method.clone(),
            content_type: self.content_type.clone(),
            body: self.body.clone(),
            auth: self.auth.clone(),
            timeout: self.timeout.clone(),
            on_error: self.keep_going.then_some(ErrorPolicy::Continue),
        }
    }
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref(), &args.overrides())?;

    observability::initialize_tracing(&config.logging);
    tracing::debug!(?config);

    // Reject invalid settings before any worker starts.
    config.validate()?;
    let template = RequestTemplate::from_config(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bang-worker")
        .enable_all()
        .worker_threads(config.runtime.worker_threads)
        .build()?;
    let runtime_guard = runtime.enter();

    let executor = HttpExecutor::new(template, config.timeout)?;
    tracing::info!(url = %executor.template().url(), "starting to load the server");

    let pool = WorkerPool::new(executor, config.concurrency, config.termination())
        .on_error(config.on_error);
    let report = runtime.block_on(pool.run())?;

    print!("{}", Summary::from(&report));

    // Requests abandoned at the deadline may still be in flight.
    drop(runtime_guard);
    runtime.shutdown_background();

    Ok(())
}
