//! Streaming events produced by generative upstreams

use crate::pipeline::breaker::TripReason;
use serde::{Deserialize, Serialize};

/// Unified streaming event enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StreamingEvent {
    /// Partial content delta (text streaming)
    #[serde(rename = "PartialContentDelta")]
    PartialContentDelta {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence_id: Option<u64>,
    },

    /// Thinking delta (reasoning process)
    #[serde(rename = "ThinkingDelta")]
    ThinkingDelta { thinking: String },

    /// Tool call started
    #[serde(rename = "ToolCallStarted")]
    ToolCallStarted {
        tool_call_id: String,
        tool_name: String,
    },

    /// Partial tool call (arguments streaming)
    #[serde(rename = "PartialToolCall")]
    PartialToolCall {
        tool_call_id: String,
        arguments: String,
    },

    #[serde(rename = "ToolCallEnded")]
    ToolCallEnded { tool_call_id: String },

    /// Metadata (usage, finish reason, etc.)
    #[serde(rename = "Metadata")]
    Metadata {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },

    /// Stream end
    #[serde(rename = "StreamEnd")]
    StreamEnd {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },

    /// Terminal event substituted by the stream circuit breaker.
    #[serde(rename = "CircuitTripped")]
    CircuitTripped { reason: TripReason, notice: String },
}

impl StreamingEvent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::PartialContentDelta {
            content: content.into(),
            sequence_id: None,
        }
    }

    /// User-visible text carried by this event.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::PartialContentDelta { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn is_trip(&self) -> bool {
        matches!(self, Self::CircuitTripped { .. })
    }
}
