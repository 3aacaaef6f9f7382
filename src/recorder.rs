// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Audit Recorder
//!
//! Background task that persists audit entries off the request path.
//!
//! [`AuditRecorder::record`] only enqueues onto an unbounded channel, so the
//! download path never waits on, or fails because of, audit I/O. A single
//! worker drains the channel in order and writes each entry through the
//! [`AuditSink`] on the blocking pool. Persistence failures are logged here
//! and go no further.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, following the same pattern as
//! the other background tasks. On cancellation the worker stops accepting
//! entries, drains what is already queued, and exits.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::storage::{AuditAction, AuditEntry, AuditSink, StorageResult};

enum AuditCommand {
    Record(AuditEntry),
    /// Acknowledged once every earlier entry has been handled.
    Flush(oneshot::Sender<()>),
}

/// Cheap, cloneable handle for recording audit entries.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::UnboundedSender<AuditCommand>,
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    /// Start the worker on the current tokio runtime.
    ///
    /// The returned handle completes after `shutdown` is cancelled and the
    /// queue has drained.
    pub fn spawn(sink: Arc<dyn AuditSink>, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = AuditWorker {
            rx,
            sink: sink.clone(),
        };
        let handle = tokio::spawn(worker.run(shutdown));
        (Self { tx, sink }, handle)
    }

    /// Enqueue an entry. Never blocks, never fails.
    pub fn record(&self, entry: AuditEntry) {
        if let Err(mpsc::error::SendError(AuditCommand::Record(entry))) =
            self.tx.send(AuditCommand::Record(entry))
        {
            // Keep the entry recoverable from the process log.
            error!(
                entry = %serde_json::to_string(&entry).unwrap_or_default(),
                "Audit recorder stopped; entry not persisted"
            );
        }
    }

    /// Build and enqueue an entry from its parts.
    pub fn record_event(
        &self,
        action: AuditAction,
        statement_id: Option<&str>,
        account_ref: Option<&str>,
        token_id: Option<&str>,
        actor: &str,
        details: Map<String, Value>,
    ) {
        let mut entry = AuditEntry::new(action, actor);
        entry.statement_id = statement_id.map(str::to_string);
        entry.account_ref = account_ref.map(str::to_string);
        entry.token_id = token_id.map(str::to_string);
        entry.details = details;
        self.record(entry);
    }

    /// Wait until everything recorded before this call has been handled.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Every persisted entry, unfiltered. Filtering and pagination belong to
    /// the reporting layer.
    pub fn list_all(&self) -> StorageResult<Vec<AuditEntry>> {
        self.sink.list_all()
    }
}

struct AuditWorker {
    rx: mpsc::UnboundedReceiver<AuditCommand>,
    sink: Arc<dyn AuditSink>,
}

impl AuditWorker {
    async fn run(mut self, shutdown: CancellationToken) {
        info!("Audit recorder starting");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    self.rx.close();
                    while let Some(command) = self.rx.recv().await {
                        self.handle(command).await;
                    }
                    break;
                }
            }
        }

        info!("Audit recorder shutting down");
    }

    async fn handle(&self, command: AuditCommand) {
        match command {
            AuditCommand::Record(entry) => self.persist(entry).await,
            AuditCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    async fn persist(&self, entry: AuditEntry) {
        let sink = self.sink.clone();
        let entry_id = entry.id.clone();
        let action = entry.action;

        match tokio::task::spawn_blocking(move || sink.append(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                entry_id = %entry_id,
                action = ?action,
                error = %e,
                "Failed to persist audit entry"
            ),
            Err(e) => warn!(
                entry_id = %entry_id,
                action = ?action,
                error = %e,
                "Audit persistence task failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        entries: Mutex<Vec<AuditEntry>>,
    }

    impl AuditSink for MemorySink {
        fn append(&self, entry: &AuditEntry) -> StorageResult<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }

        fn list_all(&self) -> StorageResult<Vec<AuditEntry>> {
            Ok(self.entries.lock().unwrap().clone())
        }
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, _entry: &AuditEntry) -> StorageResult<()> {
            Err(StorageError::NotInitialized)
        }

        fn list_all(&self) -> StorageResult<Vec<AuditEntry>> {
            Err(StorageError::NotInitialized)
        }
    }

    #[tokio::test]
    async fn records_in_order_after_flush() {
        let sink = Arc::new(MemorySink::default());
        let (recorder, _handle) = AuditRecorder::spawn(sink.clone(), CancellationToken::new());

        for i in 0..10 {
            recorder.record(
                AuditEntry::new(AuditAction::DownloadFailed, "link-holder")
                    .with_detail("seq", i),
            );
        }
        recorder.flush().await;

        let entries = recorder.list_all().unwrap();
        assert_eq!(entries.len(), 10);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.details["seq"], i);
        }
    }

    #[tokio::test]
    async fn record_event_fills_all_fields() {
        let sink = Arc::new(MemorySink::default());
        let (recorder, _handle) = AuditRecorder::spawn(sink, CancellationToken::new());

        let mut details = Map::new();
        details.insert("client_ip".to_string(), Value::from("10.0.0.1"));
        recorder.record_event(
            AuditAction::DownloadSuccess,
            Some("stmt-1"),
            Some("acct-1"),
            Some("tok-1"),
            "link-holder",
            details,
        );
        recorder.flush().await;

        let entry = &recorder.list_all().unwrap()[0];
        assert_eq!(entry.action, AuditAction::DownloadSuccess);
        assert_eq!(entry.statement_id.as_deref(), Some("stmt-1"));
        assert_eq!(entry.account_ref.as_deref(), Some("acct-1"));
        assert_eq!(entry.token_id.as_deref(), Some("tok-1"));
        assert_eq!(entry.actor, "link-holder");
        assert_eq!(entry.details["client_ip"], "10.0.0.1");
    }

    #[tokio::test]
    async fn sink_failures_stay_inside_the_worker() {
        let (recorder, handle) =
            AuditRecorder::spawn(Arc::new(FailingSink), CancellationToken::new());

        recorder.record(AuditEntry::new(AuditAction::DownloadFailed, "link-holder"));
        recorder.flush().await;

        assert!(!handle.is_finished());
        recorder.record(AuditEntry::new(AuditAction::DownloadSuccess, "link-holder"));
        recorder.flush().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queue() {
        let sink = Arc::new(MemorySink::default());
        let shutdown = CancellationToken::new();
        let (recorder, handle) = AuditRecorder::spawn(sink.clone(), shutdown.clone());

        for _ in 0..25 {
            recorder.record(AuditEntry::new(AuditAction::LinkIssued, "admin"));
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(sink.list_all().unwrap().len(), 25);

        // Recording after shutdown is logged, not raised.
        recorder.record(AuditEntry::new(AuditAction::LinkIssued, "admin"));
        recorder.flush().await;
        assert_eq!(sink.list_all().unwrap().len(), 25);
    }
}
