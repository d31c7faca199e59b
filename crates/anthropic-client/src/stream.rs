//! Streaming session: producer task, relay channel, and consumption adapters.
//!
//! Each session runs two independently scheduled units connected by a bounded
//! channel. The producer owns the network response: it decodes every inbound
//! chunk into wire events and forwards them in decode order, converting read
//! stalls into timeout errors. The consumer side pulls from the channel with
//! its own inactivity window, so a silently dead producer also surfaces as a
//! timeout instead of a hang.
//!
//! A session is consumed through exactly one of [`MessageStream::run`],
//! [`MessageStream::into_events`], or [`MessageStream::into_text`]; all three
//! take the session by value, so a second consumption path is a compile
//! error.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::accumulator::MessageAccumulator;
use crate::errors::{Error, TimeoutStage};
use crate::events::{ContentDelta, StreamEvent};
use crate::message::Message;
use crate::sse::{SseDecoder, decode_frame};

pub(crate) type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<Bytes, Error>> + Send + 'static>>;

/// Tuning knobs for one streaming session.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Producer inactivity window, measured from the last successful network
    /// read.
    pub read_idle_timeout: Duration,
    /// Consumer inactivity window, measured per awaited event.
    pub recv_idle_timeout: Duration,
    /// Bounded event channel capacity between producer and consumer.
    pub channel_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            read_idle_timeout: Duration::from_secs(30),
            recv_idle_timeout: Duration::from_secs(15),
            channel_capacity: 128,
        }
    }
}

/// Handle used to request cancellation of a streaming session.
///
/// Cancellation is best-effort: the producer tears down, the network response
/// is dropped (releasing the socket), and the active consumer observes a
/// terminal [`Error::Cancelled`].
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

type EventHandler = Box<dyn FnMut(&StreamEvent) + Send>;
type TextHandler = Box<dyn FnMut(&str) + Send>;
type ResponseHandler = Box<dyn FnOnce(&Message) + Send>;
type ErrorHandler = Box<dyn FnOnce(&Error) + Send>;

#[derive(Default)]
struct Handlers {
    on_event: Vec<EventHandler>,
    on_text: Vec<TextHandler>,
    on_response: Vec<ResponseHandler>,
    on_error: Vec<ErrorHandler>,
}

/// One in-flight streaming response.
///
/// Owns the producer task and the relay channel; dropped unconsumed, the
/// producer notices the closed channel and shuts down.
pub struct MessageStream {
    request_id: uuid::Uuid,
    rx: mpsc::Receiver<Result<StreamEvent, Error>>,
    abort: AbortHandle,
    recv_idle: Duration,
    handlers: Handlers,
}

impl MessageStream {
    /// Spawns the producer task over a raw byte stream and returns the
    /// consumer-side session handle.
    pub(crate) fn spawn(bytes: ByteStream, options: &StreamOptions, request_id: uuid::Uuid) -> Self {
        // A zero capacity would make the channel unconstructible.
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let (abort_tx, abort_rx) = watch::channel(false);
        tokio::spawn(producer_task(
            bytes,
            tx,
            abort_rx,
            options.read_idle_timeout,
            request_id,
        ));
        Self {
            request_id,
            rx,
            abort: AbortHandle { tx: abort_tx },
            recv_idle: options.recv_idle_timeout,
            handlers: Handlers::default(),
        }
    }

    /// Returns the client-assigned id used to correlate log lines.
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Returns a handle that can cancel the session.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Registers a callback invoked for every relayed event, in order.
    pub fn on_event(mut self, handler: impl FnMut(&StreamEvent) + Send + 'static) -> Self {
        self.handlers.on_event.push(Box::new(handler));
        self
    }

    /// Registers a callback invoked for every text fragment, in order.
    pub fn on_text(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.handlers.on_text.push(Box::new(handler));
        self
    }

    /// Registers a callback invoked once with the finalized response.
    pub fn on_response(mut self, handler: impl FnOnce(&Message) + Send + 'static) -> Self {
        self.handlers.on_response.push(Box::new(handler));
        self
    }

    /// Registers a callback invoked once with the terminal error.
    pub fn on_error(mut self, handler: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.handlers.on_error.push(Box::new(handler));
        self
    }

    /// Folds every event through the assembler (and registered callbacks) and
    /// returns the finalized response.
    pub async fn run(mut self) -> Result<Message, Error> {
        let mut handlers = std::mem::take(&mut self.handlers);
        let result = self.fold(&mut handlers).await;
        match &result {
            Ok(message) => {
                for handler in handlers.on_response.drain(..) {
                    handler(message);
                }
            }
            Err(err) => {
                for handler in handlers.on_error.drain(..) {
                    handler(err);
                }
            }
        }
        result
    }

    /// Lazy raw-event view: a forward-only, single-pass sequence of wire
    /// events. No assembly is performed; interpretation is the caller's.
    ///
    /// The sequence ends after the terminal `message_stop` event, or after
    /// yielding the error that killed the stream.
    pub fn into_events(self) -> impl futures::Stream<Item = Result<StreamEvent, Error>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut session = state?;
            match session.next_event().await {
                None => None,
                Some(Ok(event)) => {
                    let terminal = matches!(event, StreamEvent::MessageStop);
                    Some((Ok(event), (!terminal).then_some(session)))
                }
                Some(Err(err)) => Some((Err(err), None)),
            }
        })
    }

    /// Lazy text view: the `text_delta` fragments of [`Self::into_events`].
    pub fn into_text(self) -> impl futures::Stream<Item = Result<String, Error>> + Send {
        self.into_events().filter_map(|item| async move {
            match item {
                Ok(StreamEvent::ContentBlockDelta {
                    delta: ContentDelta::TextDelta { text },
                    ..
                }) => Some(Ok(text)),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            }
        })
    }

    async fn fold(&mut self, handlers: &mut Handlers) -> Result<Message, Error> {
        let mut accumulator = MessageAccumulator::new();
        loop {
            let event = match self.next_event().await {
                Some(Ok(event)) => event,
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(Error::protocol(
                        "event channel closed before a terminal event",
                    ));
                }
            };
            for handler in handlers.on_event.iter_mut() {
                handler(&event);
            }
            if let StreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
                ..
            } = &event
            {
                for handler in handlers.on_text.iter_mut() {
                    handler(text);
                }
            }
            accumulator.apply(&event)?;
            if accumulator.is_terminal() {
                return accumulator.finish();
            }
        }
    }

    /// Awaits the next relayed event, converting consumer-side inactivity
    /// into an explicit timeout.
    async fn next_event(&mut self) -> Option<Result<StreamEvent, Error>> {
        match tokio::time::timeout(self.recv_idle, self.rx.recv()).await {
            Ok(item) => item,
            Err(_) => Some(Err(Error::timeout(TimeoutStage::Relay, self.recv_idle))),
        }
    }
}

/// Reads the network byte stream, decodes frames, and forwards events over
/// the channel in decode order. Exits on the first terminal condition: EOF,
/// transport error, decode error, read inactivity, cancellation, or a dropped
/// consumer.
async fn producer_task(
    mut bytes: ByteStream,
    tx: mpsc::Sender<Result<StreamEvent, Error>>,
    mut abort_rx: watch::Receiver<bool>,
    read_idle: Duration,
    request_id: uuid::Uuid,
) {
    let mut decoder = SseDecoder::default();
    let mut saw_stop = false;
    loop {
        tokio::select! {
            changed = abort_rx.changed() => {
                match changed {
                    Ok(()) if *abort_rx.borrow() => {
                        debug!(request_id = %request_id, "stream cancelled");
                        let _ = tx.send(Err(Error::Cancelled)).await;
                        return;
                    }
                    Ok(()) => {}
                    // Session handle dropped; nobody is listening.
                    Err(_) => return,
                }
            }
            read = tokio::time::timeout(read_idle, bytes.next()) => {
                match read {
                    Err(_) => {
                        warn!(request_id = %request_id, elapsed = ?read_idle, "no bytes from server within read window");
                        let _ = tx.send(Err(Error::timeout(TimeoutStage::Producer, read_idle))).await;
                        return;
                    }
                    Ok(Some(Ok(chunk))) => {
                        for frame in decoder.push_chunk(&chunk) {
                            match decode_frame(&frame) {
                                Ok(StreamEvent::Unknown) => {
                                    // Decoder keeps unknown kinds; dropping them is this relay's job.
                                    debug!(request_id = %request_id, event = ?frame.event, "dropping unrecognized event kind");
                                }
                                Ok(event) => {
                                    if matches!(event, StreamEvent::MessageStop) {
                                        saw_stop = true;
                                    }
                                    if tx.send(Ok(event)).await.is_err() {
                                        return;
                                    }
                                }
                                Err(err) => {
                                    let _ = tx.send(Err(err)).await;
                                    return;
                                }
                            }
                        }
                    }
                    Ok(Some(Err(err))) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                    Ok(None) => {
                        if !saw_stop {
                            let _ = tx
                                .send(Err(Error::protocol("stream ended before message_stop")))
                                .await;
                        }
                        debug!(request_id = %request_id, saw_stop, "stream ended");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn frame(event: &str, data: &str) -> String {
        format!("event: {event}\ndata: {data}\n\n")
    }

    fn haiku_payload() -> String {
        let mut payload = String::new();
        payload.push_str(&frame(
            "message_start",
            r#"{"type":"message_start","message":{"id":"msg_01","type":"message","role":"assistant","model":"claude-sonnet-4-5","content":[],"stop_reason":null,"stop_sequence":null,"usage":{"input_tokens":25,"output_tokens":1}}}"#,
        ));
        payload.push_str(&frame(
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        ));
        for piece in ["Here", "'s", " a", " haiku"] {
            payload.push_str(&frame(
                "content_block_delta",
                &format!(
                    r#"{{"type":"content_block_delta","index":0,"delta":{{"type":"text_delta","text":"{piece}"}}}}"#
                ),
            ));
        }
        payload.push_str(&frame(
            "content_block_stop",
            r#"{"type":"content_block_stop","index":0}"#,
        ));
        payload.push_str(&frame(
            "message_delta",
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":12}}"#,
        ));
        payload.push_str(&frame("message_stop", r#"{"type":"message_stop"}"#));
        payload
    }

    /// Splits a payload into fixed-size chunks that do not respect frame
    /// boundaries.
    fn chunked_bytes(payload: &str, chunk_size: usize) -> ByteStream {
        let chunks: Vec<Result<Bytes, Error>> = payload
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    fn session(bytes: ByteStream) -> MessageStream {
        MessageStream::spawn(bytes, &StreamOptions::default(), uuid::Uuid::new_v4())
    }

    fn session_with(bytes: ByteStream, options: StreamOptions) -> MessageStream {
        MessageStream::spawn(bytes, &options, uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn run_assembles_message_from_awkwardly_chunked_stream() {
        let message = session(chunked_bytes(&haiku_payload(), 7))
            .run()
            .await
            .expect("run");
        assert_eq!(message.text(), "Here's a haiku");
        assert_eq!(message.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(message.usage.output_tokens, 12);
        assert_eq!(message.usage.input_tokens, 25);
    }

    #[tokio::test]
    async fn into_text_joins_to_exact_text() {
        let mut fragments = Vec::new();
        let mut text_stream = Box::pin(session(chunked_bytes(&haiku_payload(), 11)).into_text());
        while let Some(item) = text_stream.next().await {
            fragments.push(item.expect("fragment"));
        }
        assert_eq!(fragments, vec!["Here", "'s", " a", " haiku"]);
        assert_eq!(fragments.concat(), "Here's a haiku");
    }

    #[tokio::test]
    async fn into_events_preserves_wire_order_and_ends_at_message_stop() {
        let mut events = Vec::new();
        let mut event_stream = Box::pin(session(chunked_bytes(&haiku_payload(), 5)).into_events());
        while let Some(item) = event_stream.next().await {
            events.push(item.expect("event"));
        }
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { .. }));
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
        let delta_count = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ContentBlockDelta { .. }))
            .count();
        assert_eq!(delta_count, 4);
    }

    #[tokio::test]
    async fn callbacks_fire_in_order_with_terminal_response() {
        let seen_text = Arc::new(Mutex::new(Vec::new()));
        let event_count = Arc::new(AtomicUsize::new(0));
        let responses = Arc::new(AtomicUsize::new(0));

        let seen_text_cb = seen_text.clone();
        let event_count_cb = event_count.clone();
        let responses_cb = responses.clone();
        let message = session(chunked_bytes(&haiku_payload(), 9))
            .on_event(move |_| {
                event_count_cb.fetch_add(1, Ordering::SeqCst);
            })
            .on_text(move |text| {
                seen_text_cb.lock().expect("lock").push(text.to_string());
            })
            .on_response(move |_| {
                responses_cb.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(|_| panic!("error callback must not fire on success"))
            .run()
            .await
            .expect("run");

        assert_eq!(message.text(), "Here's a haiku");
        assert_eq!(seen_text.lock().expect("lock").concat(), "Here's a haiku");
        // message_start, block start/stop, 4 deltas, message_delta, message_stop
        assert_eq!(event_count.load(Ordering::SeqCst), 9);
        assert_eq!(responses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embedded_error_event_is_terminal_for_run_and_fires_error_callback() {
        let payload = [
            frame(
                "message_start",
                r#"{"type":"message_start","message":{"id":"msg_01","type":"message","role":"assistant","model":"m","content":[],"usage":{"input_tokens":1,"output_tokens":0}}}"#,
            ),
            frame(
                "error",
                r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#,
            ),
        ]
        .concat();

        let errors = Arc::new(AtomicUsize::new(0));
        let errors_cb = errors.clone();
        let err = session(chunked_bytes(&payload, 13))
            .on_error(move |err| {
                assert!(matches!(err, Error::Stream { .. }));
                errors_cb.fetch_add(1, Ordering::SeqCst);
            })
            .run()
            .await
            .expect_err("error event must fail the run");
        assert!(matches!(err, Error::Stream { error_type, .. } if error_type == "overloaded_error"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lazy_stream_terminates_at_the_error_point() {
        let payload = [
            frame(
                "content_block_start",
                r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            ),
            frame("message_stop", "{malformed"),
        ]
        .concat();
        let mut event_stream = Box::pin(session(chunked_bytes(&payload, 100)).into_events());
        assert!(matches!(
            event_stream.next().await,
            Some(Ok(StreamEvent::ContentBlockStart { .. }))
        ));
        assert!(matches!(event_stream.next().await, Some(Err(Error::Decode(_)))));
        assert!(event_stream.next().await.is_none());
    }

    #[tokio::test]
    async fn transport_error_mid_stream_surfaces_as_terminal() {
        let chunks: Vec<Result<Bytes, Error>> = vec![
            Ok(Bytes::from(frame(
                "message_start",
                r#"{"type":"message_start","message":{"id":"msg_01","type":"message","role":"assistant","model":"m","content":[],"usage":{"input_tokens":1,"output_tokens":0}}}"#,
            ))),
            Err(Error::transport("connection reset by peer")),
        ];
        let err = session(Box::pin(stream::iter(chunks)))
            .run()
            .await
            .expect_err("transport failure must fail the run");
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn eof_before_message_stop_is_a_protocol_error() {
        let payload = frame(
            "message_start",
            r#"{"type":"message_start","message":{"id":"msg_01","type":"message","role":"assistant","model":"m","content":[],"usage":{"input_tokens":1,"output_tokens":0}}}"#,
        );
        let err = session(chunked_bytes(&payload, 100))
            .run()
            .await
            .expect_err("truncated stream must fail");
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn producer_read_inactivity_times_out() {
        let stalled: ByteStream = Box::pin(stream::pending());
        let options = StreamOptions {
            read_idle_timeout: Duration::from_millis(40),
            recv_idle_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let err = session_with(stalled, options)
            .run()
            .await
            .expect_err("stalled read must time out");
        assert_eq!(
            err,
            Error::Timeout {
                stage: TimeoutStage::Producer,
                elapsed: Duration::from_millis(40),
            }
        );
    }

    #[tokio::test]
    async fn consumer_recv_inactivity_times_out() {
        let stalled: ByteStream = Box::pin(stream::pending());
        let options = StreamOptions {
            read_idle_timeout: Duration::from_secs(5),
            recv_idle_timeout: Duration::from_millis(40),
            ..Default::default()
        };
        let err = session_with(stalled, options)
            .run()
            .await
            .expect_err("silent relay must time out");
        assert!(matches!(
            err,
            Error::Timeout {
                stage: TimeoutStage::Relay,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn abort_surfaces_cancelled_to_the_consumer() {
        let stalled: ByteStream = Box::pin(stream::pending());
        let options = StreamOptions {
            read_idle_timeout: Duration::from_secs(5),
            recv_idle_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let stream = session_with(stalled, options);
        let abort = stream.abort_handle();
        abort.abort();
        let err = stream.run().await.expect_err("aborted run must fail");
        assert_eq!(err, Error::Cancelled);
    }

    #[tokio::test]
    async fn relay_drops_unrecognized_event_kinds() {
        let payload = [
            frame("surprise", r#"{"type":"surprise","value":1}"#),
            haiku_payload(),
        ]
        .concat();
        let mut events = Vec::new();
        let mut event_stream = Box::pin(session(chunked_bytes(&payload, 17)).into_events());
        while let Some(item) = event_stream.next().await {
            events.push(item.expect("event"));
        }
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Unknown)));
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
    }
}
