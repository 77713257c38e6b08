//! Cancellation of a whole run.
//!
//! The run is raced against a cancellation future. When cancellation wins,
//! the in-flight work is dropped (child processes die with it) and the
//! ledger is torn down once.

use crate::ledger::{Ledger, TeardownReport};
use std::future::Future;

/// How a raced run ended
#[derive(Debug)]
pub enum Outcome<T> {
    /// The work finished on its own
    Completed(T),
    /// Cancellation fired first; temporary resources were removed
    Interrupted(TeardownReport),
}

/// Run `work` until it finishes or `cancel` resolves.
pub async fn run_interruptible<T>(
    work: impl Future<Output = T>,
    cancel: impl Future<Output = ()>,
    ledger: &Ledger,
) -> Outcome<T> {
    let finished = tokio::select! {
        result = work => Some(result),
        () = cancel => None,
    };

    // Both futures are dropped by now, so no child process is still writing.
    match finished {
        Some(result) => Outcome::Completed(result),
        None => {
            log::debug!("interrupted, tearing down {:?}", ledger.snapshot());
            Outcome::Interrupted(ledger.teardown_all())
        }
    }
}

/// Resolves on Ctrl-C.
///
/// If the signal handler cannot be installed the future never resolves, so
/// the run is simply not interruptible.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
