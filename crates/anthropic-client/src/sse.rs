//! SSE frame decoding.
//!
//! The decoder is fed arbitrary byte chunks as they arrive from the network
//! and extracts every complete frame; an incomplete trailing frame stays in
//! the carry-over buffer untouched until the next chunk. Decoding is
//! chunk-boundary invariant: splitting the same payload differently never
//! changes the extracted frame sequence.

use crate::errors::Error;
use crate::events::StreamEvent;

/// One `event:`/`data:` pair, the wire unit of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental frame extractor with a carry-over buffer.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Appends a chunk and returns every frame completed by it, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((end, delim_len)) = find_frame_end(&self.buf) {
            let frame_bytes = self.buf[..end].to_vec();
            self.buf.drain(..end + delim_len);
            if let Some(frame) = parse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Finds the blank-line frame terminator, `\n\n` or `\r\n\r\n`.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len() && buf[i..i + 4] == *b"\r\n\r\n" {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        // Lines starting with ':' are keep-alive comments.
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Decodes a frame's JSON payload into a typed wire event.
///
/// Event kinds outside the protocol decode to [`StreamEvent::Unknown`];
/// whether to drop those is the relay's call. Malformed JSON is a fatal
/// [`Error::Decode`].
pub(crate) fn decode_frame(frame: &SseFrame) -> Result<StreamEvent, Error> {
    if frame.data.trim().is_empty() {
        return Ok(StreamEvent::Unknown);
    }
    serde_json::from_str(&frame.data)
        .map_err(|e| Error::decode(format!("malformed event payload: {e}")))
}
