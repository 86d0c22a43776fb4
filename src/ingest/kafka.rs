//! Kafka event source.
//!
//! Auto-commit is off; offsets are committed only after the pipeline run for
//! that record has finished. Transient receive errors are logged and skipped;
//! only a fatal client error ends the stream and forces a new consumer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rdkafka::Offset;
use rdkafka::TopicPartitionList;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message as _;
use tracing::{info, warn};

use crate::config::KafkaSettings;
use crate::error::IngestError;
use crate::ingest::source::{EventSource, RecordStream, StreamRecord};

pub struct KafkaSource {
    settings: KafkaSettings,
    consumer: Mutex<Option<Arc<StreamConsumer>>>,
}

impl KafkaSource {
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            consumer: Mutex::new(None),
        }
    }

    fn connect_error(&self, reason: impl ToString) -> IngestError {
        IngestError::ConnectFailed {
            name: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl EventSource for KafkaSource {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn start(&self) -> Result<RecordStream, IngestError> {
        let brokers = self.settings.brokers.join(",");
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &self.settings.group_id)
            .set("bootstrap.servers", &brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| self.connect_error(e))?;

        let topics: Vec<&str> = self.settings.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| self.connect_error(e))?;
        info!(brokers = %brokers, topics = ?topics, "Subscribed to Kafka topics");

        let consumer = Arc::new(consumer);
        if let Ok(mut slot) = self.consumer.lock() {
            *slot = Some(Arc::clone(&consumer));
        }

        let stream = futures::stream::unfold(consumer, |consumer| async move {
            loop {
                let item = match consumer.recv().await {
                    Ok(m) => Ok(StreamRecord {
                        topic: m.topic().to_string(),
                        partition: m.partition(),
                        offset: m.offset(),
                        payload: m.payload().map(<[u8]>::to_vec),
                    }),
                    Err(e) if is_fatal(&e) => Err(IngestError::ReceiveFailed {
                        name: "kafka".into(),
                        reason: e.to_string(),
                    }),
                    Err(e) => {
                        warn!(error = %e, "Kafka receive error, consumer kept");
                        continue;
                    }
                };
                return Some((item, consumer));
            }
        });

        Ok(Box::pin(stream))
    }

    async fn commit(&self, record: &StreamRecord) -> Result<(), IngestError> {
        let commit_error = |reason: String| IngestError::CommitFailed {
            name: self.name().to_string(),
            reason,
        };

        let consumer = self
            .consumer
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| commit_error("consumer not started".into()))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| commit_error(e.to_string()))?;
        consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| commit_error(e.to_string()))
    }
}

/// librdkafka recovers from everything except a fatal client error.
fn is_fatal(e: &KafkaError) -> bool {
    matches!(e, KafkaError::MessageConsumptionFatal(_))
        || e.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_hiccups_are_not_fatal() {
        for code in [
            RDKafkaErrorCode::BrokerTransportFailure,
            RDKafkaErrorCode::AllBrokersDown,
            RDKafkaErrorCode::UnknownTopicOrPartition,
        ] {
            assert!(!is_fatal(&KafkaError::MessageConsumption(code)), "{code:?}");
        }
    }

    #[test]
    fn fatal_client_errors_end_the_stream() {
        assert!(is_fatal(&KafkaError::MessageConsumptionFatal(
            RDKafkaErrorCode::Fatal
        )));
        assert!(is_fatal(&KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal)));
    }
}
