//! End-of-run report, source removal and installation.

use crate::cli::OutputManager;
use crate::error::{CliError, ErrorExt, Result};
use crate::tools::Toolchain;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the run produced and what to do with it
#[derive(Debug)]
pub(super) struct Summary<'a> {
    pub source: &'a Path,
    pub outputs: Vec<PathBuf>,
    pub elapsed: Duration,
    pub remove_source: bool,
    pub install: bool,
}

/// `adb` command line installing the given packages
pub(super) fn install_command(outputs: &[PathBuf]) -> String {
    let subcommand = if outputs.len() > 1 { "install-multiple" } else { "install" };
    let mut line = format!("adb {subcommand}");
    for path in outputs {
        let path = path.display().to_string();
        if path.contains(char::is_whitespace) {
            line.push_str(&format!(" \"{path}\""));
        } else {
            line.push(' ');
            line.push_str(&path);
        }
    }
    line
}

/// Report the run and apply `--remove` / `--install`.
///
/// Tool exit codes are never trusted, so a missing output package is the
/// only signal that a rebuild failed.
pub(super) async fn finish<T: Toolchain>(toolchain: &T, summary: Summary<'_>, output: &OutputManager) -> Result<()> {
    let missing: Vec<_> = summary.outputs.iter().filter(|p| !p.is_file()).collect();
    if let Some(first) = missing.first() {
        return Err(CliError::ExecutionFailed {
            command: "rebuild".to_string(),
            reason: format!(
                "{} was not produced, check the tool output above",
                first.display()
            ),
        }
        .into());
    }

    let _ = output.section("Done");
    let _ = output.success(&format!(
        "Rebuilt in {:.1} seconds",
        summary.elapsed.as_secs_f64()
    ));
    for path in &summary.outputs {
        let _ = output.indent(&path.display().to_string());
    }

    if summary.remove_source {
        std::fs::remove_file(summary.source).fs_context("removing source", summary.source)?;
        let _ = output.info(&format!("Removed {}", summary.source.display()));
    }

    if summary.install {
        let _ = output.info("Installing with adb");
        let outcome = toolchain.install(&summary.outputs).await;
        if !outcome.succeeded() {
            let _ = output.warn("Installation failed, see the adb output above");
        }
    }

    let _ = output.info("Install command:");
    let _ = output.indent(&install_command(&summary.outputs));
    Ok(())
}
