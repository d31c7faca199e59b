//! Incremental response assembly.
//!
//! [`MessageAccumulator`] is a pure reducer: it folds one wire event at a
//! time into a growing response and performs no I/O and no timing. All
//! temporal behavior (timeouts, cancellation) lives in the stream layer.

use crate::errors::Error;
use crate::events::{ContentDelta, StreamEvent};
use crate::message::{ContentBlock, Message};

/// One content block mid-assembly.
///
/// Tool-use blocks buffer their raw `input_json_delta` fragments here until
/// `content_block_stop` parses the concatenation into a structured value.
#[derive(Debug, Clone)]
struct BlockState {
    block: ContentBlock,
    pending_input: String,
    closed: bool,
}

/// Folds wire events into a response, one event at a time.
///
/// Replaying the same event sequence from a fresh accumulator always produces
/// the same final message.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    message: Option<Message>,
    blocks: Vec<BlockState>,
    terminal: bool,
}

impl MessageAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the terminal `message_stop` event has been applied.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Applies one wire event.
    ///
    /// Lifecycle violations (a delta for a closed or never-started block, a
    /// non-contiguous start index) are fatal [`Error::Protocol`] failures; an
    /// embedded `error` event becomes [`Error::Stream`].
    pub fn apply(&mut self, event: &StreamEvent) -> Result<(), Error> {
        match event {
            StreamEvent::MessageStart { message } => {
                let mut header = message.clone();
                header.content.clear();
                header.stop_reason = None;
                header.stop_sequence = None;
                self.message = Some(header);
                self.blocks.clear();
                self.terminal = false;
                Ok(())
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                // Indices are server-assigned and contiguous from 0; a gap or
                // a rewind is a protocol violation, never padded over.
                if *index != self.blocks.len() {
                    return Err(Error::protocol(format!(
                        "content_block_start index {index} out of order (expected {})",
                        self.blocks.len()
                    )));
                }
                self.blocks.push(BlockState {
                    block: content_block.clone(),
                    pending_input: String::new(),
                    closed: false,
                });
                Ok(())
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let state = self.open_block_mut(*index, "content_block_delta")?;
                apply_delta(state, delta, *index)
            }
            StreamEvent::ContentBlockStop { index } => {
                let state = self.open_block_mut(*index, "content_block_stop")?;
                if !state.pending_input.is_empty() {
                    let input: serde_json::Value = serde_json::from_str(&state.pending_input)
                        .map_err(|e| {
                            Error::decode(format!(
                                "tool input for block {index} is not valid JSON: {e}"
                            ))
                        })?;
                    set_block_input(&mut state.block, input);
                    state.pending_input.clear();
                } else if block_takes_input(&state.block) {
                    set_block_input(&mut state.block, serde_json::json!({}));
                }
                state.closed = true;
                Ok(())
            }
            StreamEvent::MessageDelta { delta, usage } => {
                let message = self
                    .message
                    .as_mut()
                    .ok_or_else(|| Error::protocol("message_delta before message_start"))?;
                if delta.stop_reason.is_some() {
                    message.stop_reason = delta.stop_reason.clone();
                }
                if delta.stop_sequence.is_some() {
                    message.stop_sequence = delta.stop_sequence.clone();
                }
                if delta.container.is_some() {
                    message.container = delta.container.clone();
                }
                if let Some(usage) = usage {
                    usage.apply_to(&mut message.usage);
                }
                Ok(())
            }
            StreamEvent::MessageStop => {
                self.terminal = true;
                Ok(())
            }
            StreamEvent::Error { error } => Err(error.clone().into()),
            StreamEvent::Ping | StreamEvent::Unknown => Ok(()),
        }
    }

    /// Finalizes the accumulator into a complete [`Message`].
    ///
    /// Only valid after `message_stop` with every started block stopped;
    /// partial state is never returned. An open block at the terminal
    /// boundary would otherwise smuggle its placeholder tool input out as
    /// final.
    pub fn finish(self) -> Result<Message, Error> {
        if !self.terminal {
            return Err(Error::protocol(
                "stream not terminal: message_stop not observed",
            ));
        }
        if let Some(index) = self.blocks.iter().position(|state| !state.closed) {
            return Err(Error::protocol(format!(
                "message_stop with block {index} still open (missing content_block_stop)"
            )));
        }
        let mut message = self
            .message
            .ok_or_else(|| Error::protocol("message_stop without message_start"))?;
        message.content = self.blocks.into_iter().map(|state| state.block).collect();
        Ok(message)
    }

    fn open_block_mut(&mut self, index: usize, what: &str) -> Result<&mut BlockState, Error> {
        let len = self.blocks.len();
        let state = self
            .blocks
            .get_mut(index)
            .ok_or_else(|| Error::protocol(format!("{what} for unstarted index {index} ({len} blocks)")))?;
        if state.closed {
            return Err(Error::protocol(format!(
                "{what} for index {index} after its content_block_stop"
            )));
        }
        Ok(state)
    }
}

fn apply_delta(state: &mut BlockState, delta: &ContentDelta, index: usize) -> Result<(), Error> {
    match delta {
        ContentDelta::TextDelta { text } => match &mut state.block {
            ContentBlock::Text { text: existing } => {
                existing.push_str(text);
                Ok(())
            }
            block => Err(delta_mismatch("text_delta", block, index)),
        },
        ContentDelta::ThinkingDelta { thinking } => match &mut state.block {
            ContentBlock::Thinking {
                thinking: existing, ..
            } => {
                existing.push_str(thinking);
                Ok(())
            }
            block => Err(delta_mismatch("thinking_delta", block, index)),
        },
        ContentDelta::SignatureDelta { signature } => match &mut state.block {
            ContentBlock::Thinking {
                signature: existing,
                ..
            } => {
                *existing = signature.clone();
                Ok(())
            }
            block => Err(delta_mismatch("signature_delta", block, index)),
        },
        ContentDelta::InputJsonDelta { partial_json } => {
            if !block_takes_input(&state.block) {
                return Err(delta_mismatch("input_json_delta", &state.block, index));
            }
            state.pending_input.push_str(partial_json);
            Ok(())
        }
        ContentDelta::Unknown => Ok(()),
    }
}

fn delta_mismatch(delta_kind: &str, block: &ContentBlock, index: usize) -> Error {
    Error::protocol(format!(
        "{delta_kind} does not apply to block {block:?} at index {index}"
    ))
}

fn block_takes_input(block: &ContentBlock) -> bool {
    matches!(
        block,
        ContentBlock::ToolUse { .. }
            | ContentBlock::McpToolUse { .. }
            | ContentBlock::ServerToolUse { .. }
    )
}

fn set_block_input(block: &mut ContentBlock, value: serde_json::Value) {
    match block {
        ContentBlock::ToolUse { input, .. }
        | ContentBlock::McpToolUse { input, .. }
        | ContentBlock::ServerToolUse { input, .. } => *input = value,
        _ => {}
    }
}
