//! The `bang` command line load generator.
//!
//! Run `bang --help` for the available options.

use anyhow::Result;

fn main() -> Result<()> {
    bang_runner::cli::execute()
}
