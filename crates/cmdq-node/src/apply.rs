//! Background task that tails the command log and applies entries in order.
//!
//! The loop wakes when:
//! 1. A local append signals the wake handle
//! 2. The poll interval elapses (picks up appends made by other nodes)
//! 3. Shutdown is broadcast, which ends the loop
//!
//! The first entry that cannot be applied halts the node for good: the halt is
//! recorded on the [`AppliedOffset`], logged, and the loop exits. Later
//! entries are never applied around it.

use std::sync::Arc;
use std::time::Duration;

use cmdq_log::{LogError, LogSeq, OwnedLogEntry, SharedLog};
use tokio::sync::{Notify, broadcast};

use crate::error::NodeError;
use crate::executor::StatementExecutor;
use crate::gate::{AppliedOffset, ApplyHalt};

pub struct ApplyLoop {
    log: SharedLog,
    executor: Arc<dyn StatementExecutor>,
    offset: AppliedOffset,
    wake: Arc<Notify>,
    poll_interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ApplyLoop {
    pub fn new(
        log: SharedLog,
        executor: Arc<dyn StatementExecutor>,
        offset: AppliedOffset,
        wake: Arc<Notify>,
        poll_interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            log,
            executor,
            offset,
            wake,
            poll_interval,
            shutdown_rx,
        }
    }

    /// Runs until shutdown or the first apply failure.
    pub async fn run(mut self) -> Result<(), NodeError> {
        tracing::info!(
            from = self.offset.next_expected(),
            "apply loop started"
        );
        loop {
            let applied = self.catch_up().await?;
            if applied > 0 {
                tracing::debug!(applied, "caught up with command log");
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }
        tracing::info!(applied = ?self.offset.applied(), "apply loop stopped");
        Ok(())
    }

    /// Applies every entry past the applied offset. Returns how many were applied.
    ///
    /// The log read runs on the blocking pool since file-backed logs do disk I/O.
    pub async fn catch_up(&self) -> Result<usize, NodeError> {
        if let Some(halt) = self.offset.state().halted {
            return Err(NodeError::ApplyHalted {
                seq: halt.seq,
                reason: halt.reason,
            });
        }
        let next = self.offset.next_expected();
        let log = self.log.clone();
        let read = tokio::task::spawn_blocking(move || log.load_from(next)).await;
        let entries = match read {
            Ok(Ok(entries)) => entries,
            Ok(Err(LogError::Corrupt(reason))) => {
                return Err(self.halt(next, format!("command log corrupt: {reason}")));
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "failed to read command log; retrying");
                return Ok(0);
            }
            Err(err) => {
                tracing::warn!(error = %err, "command log read task failed; retrying");
                return Ok(0);
            }
        };

        let mut applied = 0;
        for entry in entries {
            self.apply_entry(entry)?;
            applied += 1;
        }
        Ok(applied)
    }

    fn apply_entry(&self, entry: OwnedLogEntry) -> Result<(), NodeError> {
        let expected = self.offset.next_expected();
        if entry.seq != expected {
            return Err(self.halt(
                expected,
                format!("gap in command log: expected offset {expected}, found {}", entry.seq),
            ));
        }
        let record = entry
            .record()
            .map_err(|err| self.halt(entry.seq, format!("undecodable command: {err}")))?;
        self.executor
            .apply(entry.seq, &record)
            .map_err(|err| self.halt(entry.seq, format!("'{}': {err}", record.statement_text)))?;
        self.offset.advance(entry.seq);
        tracing::debug!(
            seq = entry.seq,
            kind = ?entry.kind,
            "applied command"
        );
        Ok(())
    }

    fn halt(&self, seq: LogSeq, reason: String) -> NodeError {
        tracing::error!(seq, %reason, "apply halted");
        self.offset.halt(ApplyHalt {
            seq,
            reason: reason.clone(),
        });
        NodeError::ApplyHalted { seq, reason }
    }
}

#[cfg(test)]
mod tests {
    use cmdq_log::{CommandRecord, LogEntry, LogKind, MemLog};
    use cmdq_statement::{ParsedStatement, parse_statements};

    use super::*;
    use crate::executor::SessionExecutor;

    struct Fixture {
        log: SharedLog,
        executor: Arc<SessionExecutor>,
        offset: AppliedOffset,
        wake: Arc<Notify>,
        shutdown_tx: broadcast::Sender<()>,
    }

    impl Fixture {
        fn new() -> Self {
            let (shutdown_tx, _) = broadcast::channel(1);
            Self {
                log: SharedLog::new(MemLog::new()),
                executor: Arc::new(SessionExecutor::default()),
                offset: AppliedOffset::new(),
                wake: Arc::new(Notify::new()),
                shutdown_tx,
            }
        }

        fn apply_loop(&self) -> ApplyLoop {
            ApplyLoop::new(
                self.log.clone(),
                self.executor.clone(),
                self.offset.clone(),
                self.wake.clone(),
                Duration::from_secs(60),
                self.shutdown_tx.subscribe(),
            )
        }

        fn append(&self, text: &str) -> LogSeq {
            let ParsedStatement { text, statement } = parse_statements(text).unwrap().remove(0);
            self.log
                .append_record(&CommandRecord {
                    statement_text: text,
                    statement,
                    overrides: Default::default(),
                    submitted_at_ns: 0,
                })
                .unwrap()
        }
    }

    #[tokio::test]
    async fn catch_up_applies_in_order() {
        let fx = Fixture::new();
        fx.append("REGISTER TOPIC a");
        fx.append("REGISTER TOPIC b");
        fx.append("DROP TOPIC a");

        let apply = fx.apply_loop();
        assert_eq!(apply.catch_up().await.unwrap(), 3);
        assert_eq!(fx.offset.applied(), Some(2));
        assert_eq!(fx.executor.snapshot().topics, vec!["b".to_string()]);

        assert_eq!(apply.catch_up().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_command_halts_without_skipping() {
        let fx = Fixture::new();
        fx.append("REGISTER TOPIC a");
        fx.append("REGISTER TOPIC a");
        fx.append("REGISTER TOPIC b");

        let apply = fx.apply_loop();
        let err = apply.catch_up().await.unwrap_err();
        assert!(matches!(err, NodeError::ApplyHalted { seq: 1, .. }));

        let state = fx.offset.state();
        assert_eq!(state.applied, Some(0));
        let halt = state.halted.unwrap();
        assert_eq!(halt.seq, 1);
        assert!(halt.reason.contains("already exists"), "{}", halt.reason);

        // later catch-ups stay halted and never reach offset 2
        assert!(apply.catch_up().await.is_err());
        assert_eq!(fx.executor.snapshot().topics, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn undecodable_payload_halts() {
        let fx = Fixture::new();
        fx.log
            .append(LogEntry::new(LogKind::RegisterTopic, b"not cbor"))
            .unwrap();
        let err = fx.apply_loop().catch_up().await.unwrap_err();
        assert!(matches!(err, NodeError::ApplyHalted { seq: 0, .. }));
        assert_eq!(fx.offset.applied(), None);
    }

    #[tokio::test]
    async fn wakes_on_notify_and_stops_on_shutdown() {
        let fx = Fixture::new();
        let task = tokio::spawn(fx.apply_loop().run());

        let seq = fx.append("REGISTER TOPIC orders");
        fx.wake.notify_one();
        fx.offset
            .wait_until(Duration::from_secs(5), |state| state.reached(seq))
            .await
            .expect("command applied");

        fx.shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_returns_error_after_halt() {
        let fx = Fixture::new();
        fx.append("DROP TOPIC missing");
        let err = fx.apply_loop().run().await.unwrap_err();
        assert!(matches!(err, NodeError::ApplyHalted { seq: 0, .. }));
    }
}
