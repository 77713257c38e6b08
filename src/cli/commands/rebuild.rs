//! The rebuild command: provision tools, dispatch the source, summarize.

use super::summary::{Summary, finish};
use crate::cli::{Args, OutputManager};
use crate::config::ToolsConfig;
use crate::dispatch;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::pipeline::{EnterKey, Pipeline, PipelineOptions, Stopwatch};
use crate::tools::{self, adb_available};

/// Execute a full rebuild of `args.source`
pub(super) async fn execute_rebuild(args: &Args, output: &OutputManager, ledger: &Ledger) -> Result<()> {
    // Fail on a bad source before any download happens
    let kind = dispatch::preflight(&args.source)?;
    log::debug!("Rebuilding {} ({:?})", args.source.display(), kind);

    let config = ToolsConfig::load(args.tools_dir.clone(), args.config.as_deref())?;

    let _ = output.section("Checking tools");
    let (toolchain, signing) = tools::provision(&config, &args.keystore_args(), ledger, output).await?;

    let install = if args.install && !adb_available().await {
        output.error("adb not found, rebuilt packages will not be installed automatically");
        false
    } else {
        args.install
    };

    let options = PipelineOptions {
        preserve_working_tree: args.preserve,
        pause_before_build: args.pause,
        decompile_options: args.decompile_options(),
        signing,
    };

    let _ = output.section("Rebuilding");
    let mut total = Stopwatch::started();
    let mut pipeline = Pipeline::new(&toolchain, ledger.clone(), options, EnterKey, output);
    let outputs = dispatch::dispatch(&args.source, args.output.as_deref(), &mut pipeline, &mut total).await?;
    total.stop();

    let summary = Summary {
        source: &args.source,
        outputs,
        elapsed: total.elapsed(),
        remove_source: args.remove,
        install,
    };
    finish(&toolchain, summary, output).await
}
