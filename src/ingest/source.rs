//! Event source abstraction.

use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::IngestError;

/// One record pulled off a topic.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// Stream of records. An `Err` item means the connection is gone.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<StreamRecord, IngestError>> + Send>>;

/// A subscribable record source.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Get the name of this source.
    fn name(&self) -> &str;

    /// Connect and start streaming. Called again after a failure.
    async fn start(&self) -> Result<RecordStream, IngestError>;

    /// Acknowledge a record once its pipeline run has finished.
    async fn commit(&self, record: &StreamRecord) -> Result<(), IngestError>;
}

/// In-process source fed through an mpsc channel.
pub struct ChannelSource {
    rx: Mutex<Option<mpsc::Receiver<StreamRecord>>>,
    committed: Mutex<Vec<(String, i32, i64)>>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<StreamRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                rx: Mutex::new(Some(rx)),
                committed: Mutex::new(Vec::new()),
            },
            tx,
        )
    }

    /// `(topic, partition, offset)` of every committed record, in order.
    pub fn committed(&self) -> Vec<(String, i32, i64)> {
        self.committed
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    async fn start(&self) -> Result<RecordStream, IngestError> {
        let rx = self
            .rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| IngestError::ConnectFailed {
                name: self.name().to_string(),
                reason: "receiver already taken".into(),
            })?;

        Ok(Box::pin(ReceiverStream::new(rx).map(Ok)))
    }

    async fn commit(&self, record: &StreamRecord) -> Result<(), IngestError> {
        let mut committed = self.committed.lock().map_err(|e| IngestError::CommitFailed {
            name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        committed.push((record.topic.clone(), record.partition, record.offset));
        Ok(())
    }
}
