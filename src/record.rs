use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized telemetry record, ready for delivery to the ingestion
/// endpoint. The payload is always a text rendering of the original input,
/// which keeps the wire body uniform regardless of input shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Text encoding of the original input
    pub payload: String,
    /// Caller-supplied schema tag, opaque to the forwarder
    pub schema: String,
}

/// One raw input on its way into the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Raw bytes, decoded as UTF-8 text during normalization
    Bytes(Vec<u8>),
    /// Plain text, used verbatim
    Text(String),
    /// A structured JSON value, serialized to canonical JSON text
    Structured(Value),
}

impl Input {
    /// Coerces a chunk of text into either a structured value or raw text.
    /// Text that is not valid JSON passes through as-is; parse ambiguity is
    /// never an error.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Input::Structured(value),
            Err(_) => Input::Text(text.to_string()),
        }
    }
}

/// Converts an arbitrary input into a flat `{payload, schema}` record.
/// Total over all input shapes; invalid UTF-8 is decoded lossily rather than
/// rejected.
pub fn normalize(input: Input, schema_hint: &str) -> TelemetryRecord {
    let payload = match input {
        Input::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Input::Text(text) => text,
        Input::Structured(value) => match value {
            // A JSON string flattens to its contents, same as plain text
            Value::String(text) => text,
            other => other.to_string(),
        },
    };

    TelemetryRecord {
        payload,
        schema: schema_hint.to_string(),
    }
}
