//! Coalescing bursts of changes into single runs
//!
//! ```text
//! Idle --change--> Scheduled --change--> Scheduled (deadline pushed back)
//!                      |
//!                  deadline
//!                      v
//!                   Running --done--> Idle
//! ```
//!
//! Every state moves to `Done` on shutdown.

use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Scheduled { deadline: Instant },
    Running,
    Done,
}

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Idle,
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Scheduled { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// A change arrived; (re)arm the timer
    pub fn change(&mut self) {
        if self.state == DebounceState::Done {
            return;
        }
        let deadline = Instant::now() + self.delay;
        trace!("Debounce armed until {:?}", deadline);
        self.state = DebounceState::Scheduled { deadline };
    }

    /// The timer elapsed; returns whether a run should start now
    pub fn fire(&mut self) -> bool {
        match self.state {
            DebounceState::Scheduled { deadline } if Instant::now() >= deadline => {
                self.state = DebounceState::Running;
                true
            }
            _ => false,
        }
    }

    pub fn finish(&mut self) {
        if self.state == DebounceState::Running {
            self.state = DebounceState::Idle;
        }
    }

    pub fn shutdown(&mut self) {
        self.state = DebounceState::Done;
    }
}

/// Work driven by a debounced change feed
pub trait Debounced {
    type Change;

    /// Take note of a change; returns whether it warrants a run
    fn accept(&mut self, change: Self::Change) -> bool;

    /// One run; no change is taken in until it completes
    fn run(&mut self) -> impl Future<Output = ()> + Send;
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Feed `changes` into `target`, running it once per quiet period of `delay`
///
/// Ends when `token` is cancelled, or when the feed closes (after flushing a
/// pending run). Returns the number of runs.
pub async fn debounce<D: Debounced>(
    target: &mut D,
    changes: &mut mpsc::Receiver<D::Change>,
    delay: Duration,
    token: &CancellationToken,
) -> usize {
    let mut debouncer = Debouncer::new(delay);
    let mut runs = 0;
    let mut open = true;

    loop {
        if !open && debouncer.deadline().is_none() {
            break;
        }
        let deadline = debouncer.deadline();
        tokio::select! {
            _ = token.cancelled() => break,
            change = changes.recv(), if open => match change {
                Some(change) => {
                    if target.accept(change) {
                        debouncer.change();
                    }
                }
                None => open = false,
            },
            _ = sleep_until_some(deadline) => {
                if debouncer.fire() {
                    target.run().await;
                    runs += 1;
                    debouncer.finish();
                }
            }
        }
    }

    debouncer.shutdown();
    runs
}
