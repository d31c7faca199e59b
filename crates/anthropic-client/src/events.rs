//! Typed wire events decoded from the streaming protocol.
//!
//! The event union is closed and discriminated by the payload's `type` field;
//! event kinds this client does not know about decode to
//! [`StreamEvent::Unknown`] instead of failing, so new server-side kinds stay
//! forward compatible.

use crate::errors::ApiError;
use crate::message::{ContentBlock, Message, Usage};

/// Incremental update targeting one content block.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    /// Appends text to a `text` block.
    TextDelta { text: String },
    /// Appends a raw JSON fragment to a tool-use block's pending input.
    InputJsonDelta { partial_json: String },
    /// Appends text to a `thinking` block.
    ThinkingDelta { thinking: String },
    /// Replaces the signature of a `thinking` block.
    SignatureDelta { signature: String },
    /// Delta kind this client does not know about yet.
    #[serde(other)]
    Unknown,
}

/// Top-level message fields carried by a `message_delta` event.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<serde_json::Value>,
}

/// Partial usage counters carried by a `message_delta` event.
///
/// Present fields overwrite the accumulator's counters; absent fields leave
/// them untouched.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UsageDelta {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub service_tier: Option<String>,
}

impl UsageDelta {
    /// Overwrites `usage` with whichever fields this delta carries.
    pub(crate) fn apply_to(&self, usage: &mut Usage) {
        if let Some(input_tokens) = self.input_tokens {
            usage.input_tokens = input_tokens;
        }
        if let Some(output_tokens) = self.output_tokens {
            usage.output_tokens = output_tokens;
        }
        if let Some(tokens) = self.cache_creation_input_tokens {
            usage.cache_creation_input_tokens = Some(tokens);
        }
        if let Some(tokens) = self.cache_read_input_tokens {
            usage.cache_read_input_tokens = Some(tokens);
        }
        if let Some(tier) = self.service_tier.clone() {
            usage.service_tier = Some(tier);
        }
    }
}

/// One decoded wire event.
///
/// Events are created by the frame decoder and never mutated afterwards; the
/// consumer observes them in exactly wire arrival order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Opens the stream with the response header (empty content).
    MessageStart { message: Message },
    /// Opens the content block at the given index.
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    /// Incremental update for the content block at the given index.
    ContentBlockDelta { index: usize, delta: ContentDelta },
    /// Closes the content block at the given index.
    ContentBlockStop { index: usize },
    /// Final top-level field updates (stop reason, usage).
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<UsageDelta>,
    },
    /// Terminal event; the accumulated response is complete after this.
    MessageStop,
    /// Keep-alive; carries nothing.
    Ping,
    /// Server-reported failure embedded mid-stream.
    Error { error: ApiError },
    /// Event kind this client does not know about yet.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lifecycle_event_kinds_by_tag() {
        let start: StreamEvent = serde_json::from_value(serde_json::json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "text", "text": ""}
        }))
        .expect("start");
        assert!(matches!(
            start,
            StreamEvent::ContentBlockStart { index: 0, .. }
        ));

        let delta: StreamEvent = serde_json::from_value(serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "Hi"}
        }))
        .expect("delta");
        assert_eq!(
            delta,
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text: "Hi".into() },
            }
        );

        let stop: StreamEvent =
            serde_json::from_value(serde_json::json!({"type": "message_stop"})).expect("stop");
        assert_eq!(stop, StreamEvent::MessageStop);
    }

    #[test]
    fn message_delta_carries_sibling_usage() {
        let event: StreamEvent = serde_json::from_value(serde_json::json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn", "stop_sequence": null},
            "usage": {"output_tokens": 15}
        }))
        .expect("message_delta");
        let StreamEvent::MessageDelta { delta, usage } = event else {
            panic!("expected MessageDelta");
        };
        assert_eq!(delta.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(usage.expect("usage").output_tokens, Some(15));
    }

    #[test]
    fn unknown_event_kind_is_catch_all() {
        let event: StreamEvent =
            serde_json::from_value(serde_json::json!({"type": "confetti", "amount": 3}))
                .expect("unknown");
        assert_eq!(event, StreamEvent::Unknown);
    }

    #[test]
    fn error_event_carries_structured_payload() {
        let event: StreamEvent = serde_json::from_value(serde_json::json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "slow down"}
        }))
        .expect("error event");
        assert!(matches!(
            event,
            StreamEvent::Error { error } if error.error_type == "overloaded_error"
        ));
    }
}
