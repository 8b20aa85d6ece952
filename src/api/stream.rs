use super::logging::emit_decode_error;
use crate::types::{DecodedEvent, EventEnvelope, RunEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stream message is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("stream message has no usable `type` field: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("`{event_type}` payload has an unexpected shape: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes one stream message into a typed event.
pub fn decode_event(payload: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let raw: Value = serde_json::from_slice(payload).map_err(DecodeError::Json)?;
    let envelope: EventEnvelope = serde_json::from_value(raw).map_err(DecodeError::Envelope)?;
    let id = envelope.event_id();
    let event_type = envelope.event_type.trim().to_string();
    let data = match envelope.data {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };

    let event = match event_type.as_str() {
        "session" => RunEvent::Session(payload_of(&event_type, data)?),
        "status" => RunEvent::Status(payload_of(&event_type, data)?),
        "plan" => RunEvent::Plan(payload_of(&event_type, data)?),
        "plan-update" => RunEvent::PlanUpdate(payload_of(&event_type, data)?),
        "task-start" => RunEvent::TaskStart(payload_of(&event_type, data)?),
        "task-output" => RunEvent::TaskOutput(payload_of(&event_type, data)?),
        "task-complete" => RunEvent::TaskComplete(payload_of(&event_type, data)?),
        "final" => RunEvent::Final(payload_of(&event_type, data)?),
        "run-complete" => RunEvent::RunComplete(payload_of(&event_type, data)?),
        "run-cancel" => RunEvent::RunCancel,
        "error" => RunEvent::Error(payload_of(&event_type, data)?),
        _ => RunEvent::Ignored { event_type },
    };

    Ok(DecodedEvent { id, event })
}

fn payload_of<T: DeserializeOwned>(event_type: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        event_type: event_type.to_string(),
        source,
    })
}

/// Per-connection decoder. Malformed messages are logged and dropped so one bad
/// frame never tears down the stream.
#[derive(Debug, Default)]
pub struct EventDecoder {
    decoded: u64,
    dropped: u64,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, frame: &[u8]) -> Option<DecodedEvent> {
        match decode_event(frame) {
            Ok(event) => {
                self.decoded += 1;
                Some(event)
            }
            Err(error) => {
                self.dropped += 1;
                emit_decode_error(frame, &error);
                None
            }
        }
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
