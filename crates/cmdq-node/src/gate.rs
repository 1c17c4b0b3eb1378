//! Applied-offset tracking and the sequence gate built on it.
//!
//! The apply loop is the only writer of [`AppliedOffset`]; request flows only
//! read it or wait on it. Waiting never blocks the writer: each waiter holds
//! its own `watch` receiver, and dropping the wait future (client gone,
//! request timeout) releases that receiver without touching anyone else.

use std::sync::Arc;
use std::time::Duration;

use cmdq_log::LogSeq;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

/// Why a node stopped applying the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyHalt {
    pub seq: LogSeq,
    pub reason: String,
}

/// Snapshot of a node's apply progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyState {
    /// Highest offset fully applied; `None` until the first command applies.
    pub applied: Option<LogSeq>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<ApplyHalt>,
}

impl ApplyState {
    pub fn reached(&self, bound: LogSeq) -> bool {
        self.applied.is_some_and(|applied| applied >= bound)
    }

    pub fn next_expected(&self) -> LogSeq {
        self.applied.map(|applied| applied + 1).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "timed out waiting for offset {requested} to be applied (applied offset: {})",
    describe_offset(.current)
)]
pub struct ConsistencyTimeout {
    pub requested: LogSeq,
    pub current: Option<LogSeq>,
}

fn describe_offset(offset: &Option<LogSeq>) -> String {
    match offset {
        Some(seq) => seq.to_string(),
        None => "none".into(),
    }
}

/// Node-local applied offset. Non-decreasing, advanced one offset at a time.
#[derive(Debug, Clone)]
pub struct AppliedOffset {
    tx: Arc<watch::Sender<ApplyState>>,
}

impl Default for AppliedOffset {
    fn default() -> Self {
        Self::new()
    }
}

impl AppliedOffset {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ApplyState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ApplyState {
        self.tx.borrow().clone()
    }

    pub fn applied(&self) -> Option<LogSeq> {
        self.tx.borrow().applied
    }

    pub fn next_expected(&self) -> LogSeq {
        self.tx.borrow().next_expected()
    }

    /// Marks `seq` applied. Only the offset right after the current one is
    /// accepted, and nothing advances once the node has halted; returns
    /// whether the offset moved.
    pub fn advance(&self, seq: LogSeq) -> bool {
        self.tx.send_if_modified(|state| {
            if state.halted.is_some() || seq != state.next_expected() {
                return false;
            }
            state.applied = Some(seq);
            true
        })
    }

    /// Records a permanent halt. The first halt wins.
    pub fn halt(&self, halt: ApplyHalt) {
        self.tx.send_if_modified(|state| {
            if state.halted.is_some() {
                return false;
            }
            state.halted = Some(halt);
            true
        });
    }

    /// Waits until `done` holds for the current state or `timeout` elapses.
    /// Returns the state that satisfied `done`, or `None` on timeout.
    pub async fn wait_until(
        &self,
        timeout: Duration,
        mut done: impl FnMut(&ApplyState) -> bool,
    ) -> Option<ApplyState> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            // the sender lives as long as `self`, so `wait_for` cannot fail here
            rx.wait_for(|state| done(state)).await.ok().map(|state| state.clone())
        })
        .await;
        waited.ok().flatten()
    }
}

/// Blocks a request until the local applied offset reaches its bound.
#[derive(Debug, Clone)]
pub struct SequenceGate {
    offset: AppliedOffset,
    timeout: Duration,
}

impl SequenceGate {
    pub fn new(offset: AppliedOffset, timeout: Duration) -> Self {
        Self { offset, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits with the gate's configured timeout.
    pub async fn wait_for(&self, bound: Option<LogSeq>) -> Result<(), ConsistencyTimeout> {
        self.wait_for_within(bound, self.timeout).await
    }

    /// No bound proceeds immediately, as does a bound already applied.
    pub async fn wait_for_within(
        &self,
        bound: Option<LogSeq>,
        timeout: Duration,
    ) -> Result<(), ConsistencyTimeout> {
        let Some(bound) = bound else {
            return Ok(());
        };
        if self.offset.state().reached(bound) {
            return Ok(());
        }
        tracing::debug!(bound, "waiting for applied offset");
        match self
            .offset
            .wait_until(timeout, |state| state.reached(bound))
            .await
        {
            Some(_) => Ok(()),
            None => {
                let current = self.offset.applied();
                tracing::warn!(
                    requested = bound,
                    current = ?current,
                    "consistency wait timed out"
                );
                Err(ConsistencyTimeout {
                    requested: bound,
                    current,
                })
            }
        }
    }
}
