use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stop request sent by the overlay, as a bare JSON string.
pub const STOP_LITERAL: &str = "stop";

/// Primary -> overlay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OverlayMessage {
    #[serde(rename = "UPDATE_TIME", rename_all = "camelCase")]
    UpdateTime { seconds: u64, task_name: String },
}

impl OverlayMessage {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Overlay -> primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Stop,
}

impl ControlMessage {
    /// Anything other than the stop literal is unrecognized and yields `None`.
    pub fn parse(message: &Value) -> Option<Self> {
        match message {
            Value::String(text) if text == STOP_LITERAL => Some(ControlMessage::Stop),
            _ => None,
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            ControlMessage::Stop => Value::String(STOP_LITERAL.to_string()),
        }
    }
}
