//! Pausable duration accounting and the operator resume signal.

use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::time::Instant;

/// Accumulates running time across start/stop cycles
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl Stopwatch {
    /// A stopwatch that is already running
    pub fn started() -> Self {
        Self {
            running_since: Some(Instant::now()),
            accumulated: Duration::ZERO,
        }
    }

    /// Resume counting. No-op while running.
    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    /// Stop counting and bank the time run so far. No-op while stopped.
    pub fn stop(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    /// Whether the stopwatch is counting
    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Total counted time, including the current running stretch
    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}

/// Something the pipeline can wait on while paused
#[allow(async_fn_in_trait)]
pub trait ResumeSignal {
    /// Resolve once the operator wants the run to continue
    async fn wait(&mut self);
}

/// Resumes when a line is read from stdin (the operator pressed ENTER)
#[derive(Debug, Default)]
pub struct EnterKey;

impl ResumeSignal for EnterKey {
    async fn wait(&mut self) {
        let mut line = String::new();
        let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = stdin.read_line(&mut line).await {
            log::warn!("Could not read from stdin, continuing: {}", e);
        }
    }
}
