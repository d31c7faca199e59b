use std::fmt;
use std::time::Duration;

/// Which inactivity window expired for a [`Error::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// No bytes arrived from the network within the read window.
    Producer,
    /// No event was relayed to the consumer within the receive window.
    Relay,
}

impl fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => f.write_str("producer"),
            Self::Relay => f.write_str("relay"),
        }
    }
}

/// Structured error payload returned by the API, both in non-2xx response
/// bodies and in `error` events embedded mid-stream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApiError {
    /// Machine-readable error kind (for example `not_found`).
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable description.
    pub message: String,
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

/// Top-level error type for the client API.
///
/// The same taxonomy is surfaced by every consumption path: `run` returns it,
/// the lazy event/text streams yield it as their final item, and the
/// registered error callback receives it exactly once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Connection or stream I/O failed before or during the response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The API answered with a non-2xx status.
    #[error("HTTP {status} ({error_type}): {message}")]
    Http {
        status: u16,
        error_type: String,
        message: String,
    },
    /// The server embedded an `error` event in an otherwise live stream.
    #[error("stream error ({error_type}): {message}")]
    Stream { error_type: String, message: String },
    /// An inactivity window expired. Converts a silent stall into an explicit
    /// failure instead of blocking indefinitely.
    #[error("{stage} inactivity timeout after {elapsed:?}")]
    Timeout {
        stage: TimeoutStage,
        elapsed: Duration,
    },
    /// Malformed JSON inside a well-formed frame. Fatal, never retried.
    #[error("decode error: {0}")]
    Decode(String),
    /// The event sequence violated the streaming protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The stream was cancelled through its [`AbortHandle`](crate::AbortHandle).
    #[error("stream cancelled")]
    Cancelled,
}

impl Error {
    /// Creates a config-level error.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a transport-level error.
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a decode error.
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates a protocol-violation error.
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Creates a timeout error for the given stage.
    pub(crate) fn timeout(stage: TimeoutStage, elapsed: Duration) -> Self {
        Self::Timeout { stage, elapsed }
    }

    /// Builds an [`Error::Http`] from a status code and raw response body.
    ///
    /// Bodies shaped like `{"error":{"type":...,"message":...}}` are parsed
    /// into their structured fields; anything else falls back to a generic
    /// `api_error` with the body (or a placeholder for empty bodies) as the
    /// message.
    pub(crate) fn http(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::Http {
                status,
                error_type: envelope.error.error_type,
                message: envelope.error.message,
            },
            Err(_) => Self::Http {
                status,
                error_type: "api_error".to_string(),
                message: if body.trim().is_empty() {
                    format!("HTTP {status} with empty response body")
                } else {
                    body.trim().to_string()
                },
            },
        }
    }

    /// Returns true for timeout errors regardless of stage.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<ApiError> for Error {
    fn from(value: ApiError) -> Self {
        Self::Stream {
            error_type: value.error_type,
            message: value.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_parses_structured_body() {
        let err = Error::http(
            404,
            r#"{"error":{"type":"not_found","message":"model not found"}}"#,
        );
        assert_eq!(
            err,
            Error::Http {
                status: 404,
                error_type: "not_found".into(),
                message: "model not found".into(),
            }
        );
    }

    #[test]
    fn http_error_falls_back_for_empty_body() {
        let err = Error::http(500, "");
        let Error::Http {
            status,
            error_type,
            message,
        } = err
        else {
            panic!("expected Http error");
        };
        assert_eq!(status, 500);
        assert_eq!(error_type, "api_error");
        assert!(message.contains("empty response body"));
    }

    #[test]
    fn http_error_keeps_unstructured_body_as_message() {
        let err = Error::http(502, "bad gateway");
        assert!(matches!(err, Error::Http { message, .. } if message == "bad gateway"));
    }

    #[test]
    fn stream_error_from_api_error_payload() {
        let err: Error = ApiError {
            error_type: "overloaded_error".into(),
            message: "try again".into(),
        }
        .into();
        assert!(matches!(err, Error::Stream { error_type, .. } if error_type == "overloaded_error"));
    }
}
