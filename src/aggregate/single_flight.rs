// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Generation-counted single-flight runner.
//!
//! At most one flight is live. Starting a flight bumps the generation and
//! signals the predecessor's cancel channel; the predecessor notices at its
//! next suspension point and drops its work. A result is applied only if its
//! generation is still current when it completes, and only under the flight
//! lock, so a superseded result can never overwrite a newer one.
//!
//! Every caller, superseded or not, returns the outcome of the most recently
//! started flight.
//!
//! ```text
//!            run()                 work done, still current
//!   Idle ──────────▶ Refreshing{g} ─────────────────────────▶ Idle (Success | Failure)
//!                        │
//!                        │ run() again / cancel()
//!                        ▼
//!                    Refreshing{g+1}   (flight g: Cancelled, result discarded)
//! ```

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::error::SyncError;

/// Observable refresh state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing { generation: u64 },
}

impl std::fmt::Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Refreshing { generation } => write!(f, "Refreshing({})", generation),
        }
    }
}

/// How a flight ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Result applied
    Success,
    /// Superseded or stopped; nothing applied, not an error
    Cancelled,
    /// Nothing applied; the error is kept for the caller
    Failure(SyncError),
}

impl RefreshOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::Failure(_) => "failure",
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

struct Flight {
    generation: u64,
    cancel: Option<oneshot::Sender<()>>,
}

pub struct SingleFlight {
    flight: Mutex<Flight>,
    state: watch::Sender<RefreshState>,
    completed: watch::Sender<Option<(u64, RefreshOutcome)>>,
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        let (completed, _) = watch::channel(None);
        Self {
            flight: Mutex::new(Flight { generation: 0, cancel: None }),
            state,
            completed,
        }
    }

    #[must_use]
    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    /// Generation of the most recently started (or cancelled) flight.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.flight.lock().generation
    }

    /// Run `work` as the new current flight, superseding any live one.
    ///
    /// `apply` runs only if this flight is still current when `work`
    /// succeeds. Returns the outcome of the latest flight.
    pub async fn run<T, F, A>(&self, work: F, apply: A) -> RefreshOutcome
    where
        F: Future<Output = Result<T, SyncError>>,
        A: FnOnce(T),
    {
        let (generation, mut cancel_rx) = self.begin();
        let mut guard = AbandonGuard { owner: self, generation, armed: true };

        let result = tokio::select! {
            biased;
            _ = &mut cancel_rx => None,
            result = work => Some(result),
        };
        guard.armed = false;

        let Some(result) = result else {
            debug!(generation, "refresh superseded");
            return self.await_latest().await;
        };

        {
            let mut flight = self.flight.lock();
            if flight.generation == generation {
                let outcome = match result {
                    Ok(value) => {
                        apply(value);
                        RefreshOutcome::Success
                    }
                    Err(e) if e.is_cancelled() => RefreshOutcome::Cancelled,
                    Err(e) => RefreshOutcome::Failure(e),
                };
                self.finish(&mut flight, generation, outcome.clone());
                return outcome;
            }
        }

        debug!(generation, "refresh finished after being superseded, result discarded");
        self.await_latest().await
    }

    /// Cancel the live flight, if any. Awaiting callers observe `Cancelled`.
    pub fn cancel(&self) {
        let mut flight = self.flight.lock();
        if let Some(cancel) = flight.cancel.take() {
            let _ = cancel.send(());
            flight.generation += 1;
            let generation = flight.generation;
            self.finish(&mut flight, generation, RefreshOutcome::Cancelled);
            debug!(generation, "refresh cancelled");
        }
    }

    fn begin(&self) -> (u64, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let mut flight = self.flight.lock();
        if let Some(previous) = flight.cancel.take() {
            let _ = previous.send(());
        }
        flight.generation += 1;
        flight.cancel = Some(tx);
        self.state.send_replace(RefreshState::Refreshing { generation: flight.generation });
        (flight.generation, rx)
    }

    /// Caller holds the flight lock.
    fn finish(&self, flight: &mut Flight, generation: u64, outcome: RefreshOutcome) {
        flight.cancel = None;
        self.state.send_replace(RefreshState::Idle);
        self.completed.send_replace(Some((generation, outcome)));
    }

    /// Wait for the flight that is current at completion time to finish.
    async fn await_latest(&self) -> RefreshOutcome {
        let mut completed = self.completed.subscribe();
        loop {
            let current = self.flight.lock().generation;
            if let Some((generation, outcome)) = &*completed.borrow_and_update() {
                if *generation == current {
                    return outcome.clone();
                }
            }
            if completed.changed().await.is_err() {
                return RefreshOutcome::Cancelled;
            }
        }
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Closes the flight as `Cancelled` if the caller drops `run` mid-flight,
/// so nobody waits on a result that will never come.
struct AbandonGuard<'a> {
    owner: &'a SingleFlight,
    generation: u64,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut flight = self.owner.flight.lock();
        if flight.generation == self.generation {
            self.owner.finish(&mut flight, self.generation, RefreshOutcome::Cancelled);
            debug!(generation = self.generation, "refresh abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_run_applies() {
        let flight = SingleFlight::new();
        let mut applied = None;
        let outcome = flight.run(async { Ok(7) }, |v| applied = Some(v)).await;
        assert_eq!(outcome, RefreshOutcome::Success);
        assert_eq!(applied, Some(7));
        assert_eq!(flight.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_applied() {
        let flight = SingleFlight::new();
        let mut applied = false;
        let outcome = flight
            .run(async { Err::<(), _>(SyncError::NetworkError("down".into())) }, |_| applied = true)
            .await;
        assert_eq!(outcome, RefreshOutcome::Failure(SyncError::NetworkError("down".into())));
        assert!(!applied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_supersedes_first() {
        let flight = Arc::new(SingleFlight::new());
        let applied = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let applies = Arc::new(AtomicUsize::new(0));

        let first = {
            let (flight, applied, applies) = (flight.clone(), applied.clone(), applies.clone());
            tokio::spawn(async move {
                flight
                    .run(
                        async {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                            Ok("first")
                        },
                        |v| {
                            applies.fetch_add(1, Ordering::SeqCst);
                            applied.lock().push(v);
                        },
                    )
                    .await
            })
        };
        while flight.state() == RefreshState::Idle {
            tokio::task::yield_now().await;
        }
        assert_eq!(flight.state(), RefreshState::Refreshing { generation: 1 });

        let second = {
            let (flight, applied, applies) = (flight.clone(), applied.clone(), applies.clone());
            tokio::spawn(async move {
                flight
                    .run(
                        async {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            Ok("second")
                        },
                        |v| {
                            applies.fetch_add(1, Ordering::SeqCst);
                            applied.lock().push(v);
                        },
                    )
                    .await
            })
        };

        let (first, second) = (first.await.unwrap(), second.await.unwrap());
        assert_eq!(first, RefreshOutcome::Success);
        assert_eq!(second, RefreshOutcome::Success);
        assert_eq!(applies.load(Ordering::SeqCst), 1);
        assert_eq!(*applied.lock(), vec!["second"]);
        assert_eq!(flight.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_live_flight() {
        let flight = Arc::new(SingleFlight::new());
        let task = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run(
                        async {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            Ok(())
                        },
                        |_| panic!("cancelled flight must not apply"),
                    )
                    .await
            })
        };
        while flight.state() == RefreshState::Idle {
            tokio::task::yield_now().await;
        }
        flight.cancel();
        assert_eq!(task.await.unwrap(), RefreshOutcome::Cancelled);
        assert_eq!(flight.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_without_flight_is_noop() {
        let flight = SingleFlight::new();
        flight.cancel();
        assert_eq!(flight.generation(), 0);
        assert_eq!(flight.state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_flight_closes_as_cancelled() {
        let flight = Arc::new(SingleFlight::new());
        let task = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run(
                        async {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            Ok(())
                        },
                        |_| {},
                    )
                    .await
            })
        };
        while flight.state() == RefreshState::Idle {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert_eq!(flight.state(), RefreshState::Idle);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RefreshOutcome::Success.label(), "success");
        assert_eq!(RefreshOutcome::Cancelled.label(), "cancelled");
        assert_eq!(RefreshOutcome::Failure(SyncError::Cancelled).label(), "failure");
        assert_eq!(format!("{}", RefreshState::Refreshing { generation: 3 }), "Refreshing(3)");
    }
}
