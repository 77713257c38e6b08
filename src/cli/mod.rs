//! Command line interface for apk_rebuild.

mod args;
pub mod commands;
mod output;

pub use args::Args;
pub use commands::execute;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute(args).await
}
