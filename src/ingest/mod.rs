//! Event ingestion: stream records in, pipeline runs out.

pub mod consumer;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mapping;
pub mod source;

pub use consumer::{IngestionLoop, IngestionStatus};
#[cfg(feature = "kafka")]
pub use kafka::KafkaSource;
pub use mapping::{event_type_to_topic, record_to_event, topic_to_event_type};
pub use source::{ChannelSource, EventSource, RecordStream, StreamRecord};
