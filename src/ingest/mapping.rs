//! Stream record → `Event` mapping.

use serde_json::{Map, Value};

use crate::error::IngestError;
use crate::ingest::source::StreamRecord;
use crate::pipeline::types::{Event, Recipient};

const TENANT_FIELDS: &[&[&str]] = &[&["tenantId"]];
const USER_ID_FIELDS: &[&[&str]] = &[&["userId"], &["citizen", "uuid"]];
const PHONE_FIELDS: &[&[&str]] = &[&["mobileNumber"], &["citizen", "mobileNumber"]];

/// `pgr-create` → `PGR_CREATE`.
pub fn topic_to_event_type(topic: &str) -> String {
    topic.replace('-', "_").to_uppercase()
}

/// `PGR_CREATE` → `pgr-create`.
pub fn event_type_to_topic(event_type: &str) -> String {
    event_type.to_lowercase().replace('_', "-")
}

/// Build an event from one record. The whole body becomes the template data.
pub fn record_to_event(record: &StreamRecord, default_tenant: &str) -> Result<Event, IngestError> {
    let payload = record
        .payload
        .as_deref()
        .filter(|p| !p.iter().all(u8::is_ascii_whitespace))
        .ok_or_else(|| IngestError::EmptyPayload {
            topic: record.topic.clone(),
        })?;

    let invalid = |reason: String| IngestError::InvalidPayload {
        topic: record.topic.clone(),
        reason,
    };

    let text = std::str::from_utf8(payload).map_err(|e| invalid(e.to_string()))?;
    let body: Value = serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(data) = body else {
        return Err(invalid("expected a JSON object".into()));
    };

    let tenant_id =
        first_string(&data, TENANT_FIELDS).unwrap_or_else(|| default_tenant.to_string());
    let recipient = Recipient {
        user_id: first_string(&data, USER_ID_FIELDS),
        phone: first_string(&data, PHONE_FIELDS),
    };

    Ok(Event {
        event_type: topic_to_event_type(&record.topic),
        tenant_id,
        recipient,
        data,
    })
}

/// First candidate path holding a non-empty string or a number.
fn first_string(data: &Map<String, Value>, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let (head, rest) = path.split_first()?;
        let value = rest
            .iter()
            .try_fold(data.get(*head)?, |value, key| value.get(*key))?;
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}
