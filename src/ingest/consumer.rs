//! Ingestion loop: pulls records off a source and runs each through the
//! orchestrator, one at a time.
//!
//! A record is committed only after its pipeline run has ended. Records that
//! cannot be mapped to an event are logged, committed, and skipped. When the
//! source fails the loop reconnects after a short delay. Setting the shutdown
//! flag stops the loop within one poll interval, even while the source is idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::ingest::mapping::record_to_event;
use crate::ingest::source::{EventSource, RecordStream, StreamRecord};
use crate::pipeline::orchestrator::NotificationOrchestrator;

/// Base delay before reconnecting a failed source.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How often an idle or sleeping loop checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Connection state and counters, shared with the health endpoint.
#[derive(Debug, Default)]
pub struct IngestionStatus {
    connected: AtomicBool,
    processed: AtomicU64,
    rejected: AtomicU64,
}

impl IngestionStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// `connected` / `disconnected`.
    pub fn label(&self) -> &'static str {
        if self.is_connected() {
            "connected"
        } else {
            "disconnected"
        }
    }

    /// Records that went through the pipeline.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Records skipped because they could not be mapped to an event.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

enum StreamEnd {
    /// Source drained or shutdown requested.
    Closed,
    Failed(IngestError),
}

pub struct IngestionLoop {
    source: Arc<dyn EventSource>,
    orchestrator: Arc<NotificationOrchestrator>,
    default_tenant: String,
    status: Arc<IngestionStatus>,
    reconnect_delay: Duration,
}

impl IngestionLoop {
    pub fn new(
        source: Arc<dyn EventSource>,
        orchestrator: Arc<NotificationOrchestrator>,
        default_tenant: impl Into<String>,
    ) -> Self {
        Self {
            source,
            orchestrator,
            default_tenant: default_tenant.into(),
            status: Arc::new(IngestionStatus::default()),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_status(mut self, status: Arc<IngestionStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn status(&self) -> Arc<IngestionStatus> {
        Arc::clone(&self.status)
    }

    /// Spawn the loop. Returns a `JoinHandle` and a shutdown flag.
    ///
    /// The task ends when the flag is set or the source is drained.
    pub fn spawn(self) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            info!(source = self.source.name(), "Ingestion started");

            loop {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }

                match self.source.start().await {
                    Ok(stream) => {
                        self.status.set_connected(true);
                        info!(source = self.source.name(), "Event source connected");
                        let end = self.drain(stream, &shutdown).await;
                        self.status.set_connected(false);
                        match end {
                            StreamEnd::Closed => break,
                            StreamEnd::Failed(e) => {
                                error!(source = self.source.name(), error = %e, "Event source failed");
                            }
                        }
                    }
                    Err(e) => {
                        error!(source = self.source.name(), error = %e, "Event source connect failed");
                    }
                }

                let delay = self.backoff();
                warn!(delay_ms = delay.as_millis() as u64, "Reconnecting event source");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(&shutdown) => break,
                }
            }

            info!(source = self.source.name(), "Ingestion stopped");
        });

        (handle, shutdown_flag)
    }

    async fn drain(&self, mut stream: RecordStream, shutdown: &AtomicBool) -> StreamEnd {
        loop {
            // Only the wait is raced; a record in flight always finishes and commits.
            let item = tokio::select! {
                item = stream.next() => item,
                _ = shutdown_requested(shutdown) => return StreamEnd::Closed,
            };
            let record = match item {
                Some(Ok(record)) => record,
                Some(Err(e)) => return StreamEnd::Failed(e),
                None => return StreamEnd::Closed,
            };

            self.handle_record(&record).await;

            if let Err(e) = self.source.commit(&record).await {
                warn!(topic = %record.topic, offset = record.offset, error = %e, "Commit failed");
            }
        }
    }

    async fn handle_record(&self, record: &StreamRecord) {
        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Record received"
        );

        let event = match record_to_event(record, &self.default_tenant) {
            Ok(event) => event,
            Err(e) => {
                warn!(offset = record.offset, error = %e, "Skipping unreadable record");
                self.status.rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let outcome = self.orchestrator.process(event).await;
        self.status.processed.fetch_add(1, Ordering::Relaxed);
        info!(
            topic = %record.topic,
            offset = record.offset,
            transaction_id = %outcome.transaction_id,
            status = outcome.status.label(),
            "Record processed"
        );
    }

    /// Reconnect delay plus up to 20% jitter.
    fn backoff(&self) -> Duration {
        let max_jitter = (self.reconnect_delay.as_millis() / 5) as u64;
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        self.reconnect_delay + Duration::from_millis(jitter)
    }
}

/// Resolves once the flag is set.
async fn shutdown_requested(shutdown: &AtomicBool) {
    let mut tick = tokio::time::interval(SHUTDOWN_POLL);
    loop {
        tick.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
    }
}
