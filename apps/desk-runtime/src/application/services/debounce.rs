//! Debounced Write Scheduling
//!
//! Every preference mutation arms (or re-arms) a quiet-period deadline. When
//! the deadline passes with no further mutation, exactly one flush runs for
//! the whole burst.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Quiet-period bookkeeping.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
    pending: u32,
}

impl Debouncer {
    /// Create a disarmed debouncer.
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
            pending: 0,
        }
    }

    /// Record a mutation at `now`, pushing the deadline out.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
        self.pending = self.pending.saturating_add(1);
    }

    /// Drop the pending flush. Returns how many mutations it covered.
    pub const fn cancel(&mut self) -> u32 {
        let dropped = self.pending;
        self.deadline = None;
        self.pending = 0;
        dropped
    }

    /// Current deadline, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a flush is pending.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm if the deadline has passed, returning the coalesced count.
    pub fn fire(&mut self, now: Instant) -> Option<u32> {
        match self.deadline {
            Some(deadline) if deadline <= now => Some(self.cancel()),
            _ => None,
        }
    }
}

/// Instruction for the debounce loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceCommand {
    /// A mutation happened.
    Arm,
    /// Forget the pending flush.
    Cancel,
}

/// Drive a [`Debouncer`] from a command channel until cancelled.
///
/// A flush still pending at shutdown runs once before the loop exits.
pub async fn run_debounce<F, Fut>(
    quiet: Duration,
    mut commands: mpsc::UnboundedReceiver<DebounceCommand>,
    cancel: CancellationToken,
    mut flush: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut debouncer = Debouncer::new(quiet);

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                if debouncer.cancel() > 0 {
                    tracing::debug!("Flushing pending preference write on shutdown");
                    flush().await;
                }
                break;
            }
            command = commands.recv() => match command {
                Some(DebounceCommand::Arm) => debouncer.arm(Instant::now()),
                Some(DebounceCommand::Cancel) => {
                    let dropped = debouncer.cancel();
                    if dropped > 0 {
                        tracing::debug!(dropped, "Pending preference write cancelled");
                    }
                }
                None => break,
            },
            () = sleep_until(deadline) => {
                if let Some(coalesced) = debouncer.fire(Instant::now()) {
                    tracing::debug!(coalesced, "Debounce window closed");
                    flush().await;
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
