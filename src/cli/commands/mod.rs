//! Command execution: runs the rebuild under the interrupt handler and maps
//! the result to an exit status.

mod rebuild;
mod summary;

use crate::cli::{Args, OutputManager};
use crate::error::Result;
use crate::interrupt::{self, Outcome, run_interruptible};
use crate::ledger::Ledger;
use rebuild::execute_rebuild;

/// Execute the rebuild described by `args`.
///
/// Returns the exit status for handled outcomes (including Ctrl-C, which
/// exits 0). Fatal errors are returned after temporary files are removed.
pub async fn execute(args: Args) -> Result<i32> {
    let output = OutputManager::new(false);

    if let Err(validation_error) = args.validate() {
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(1);
    }

    let ledger = Ledger::new();
    let work = execute_rebuild(&args, &output, &ledger);

    match run_interruptible(work, interrupt::ctrl_c(), &ledger).await {
        Outcome::Completed(Ok(())) => Ok(0),
        Outcome::Completed(Err(e)) => {
            let report = ledger.teardown_all();
            log::debug!(
                "cleanup after error: {} files, {} directories removed",
                report.files_removed,
                report.dirs_removed
            );
            Err(e)
        }
        Outcome::Interrupted(report) => {
            let _ = output.println("");
            let _ = output.warn("Interrupted, temporary files removed");
            for (path, reason) in &report.failures {
                output.error(&format!("Could not remove {}: {}", path.display(), reason));
            }
            Ok(0)
        }
    }
}
