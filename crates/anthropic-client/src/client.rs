//! HTTP client for the Messages API.

use std::time::Duration;

use futures::TryStreamExt as _;
use tracing::debug;

use crate::errors::Error;
use crate::message::Message;
use crate::request::MessagesRequest;
use crate::stream::{ByteStream, MessageStream, StreamOptions};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Configuration for [`Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API key sent in the `x-api-key` header.
    pub api_key: String,
    /// Base URL for the API endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// HTTP timeout applied to non-streaming requests.
    ///
    /// Streaming requests rely on the per-session inactivity windows in
    /// [`StreamOptions`] instead; a whole-request deadline would kill long
    /// streams mid-response.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with default endpoint settings and a provided key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Builds a config from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(Error::config("missing ANTHROPIC_API_KEY"));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the `anthropic-version` header value.
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Overrides the non-streaming HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

/// Async client for the Messages API.
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        if config.api_key.trim().is_empty() {
            return Err(Error::config("api_key must not be empty"));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Creates a client using `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Sends a single-shot (non-streaming) request and decodes the complete
    /// response.
    pub async fn create_message(&self, request: &MessagesRequest) -> Result<Message, Error> {
        let body = request.to_body(false)?;
        let response = self
            .base_request()
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(format!("request failed: {e}")))?;
        let response = check_status(response).await?;
        response
            .json::<Message>()
            .await
            .map_err(|e| Error::decode(format!("malformed response body: {e}")))
    }

    /// Starts a streaming request with default session options.
    ///
    /// The returned [`MessageStream`] is consumed through exactly one of its
    /// adapters: `run`, `into_events`, or `into_text`.
    pub async fn stream_messages(&self, request: &MessagesRequest) -> Result<MessageStream, Error> {
        self.stream_messages_with(request, StreamOptions::default())
            .await
    }

    /// Starts a streaming request with explicit session options.
    pub async fn stream_messages_with(
        &self,
        request: &MessagesRequest,
        options: StreamOptions,
    ) -> Result<MessageStream, Error> {
        let request_id = uuid::Uuid::new_v4();
        let body = request.to_body(true)?;
        debug!(request_id = %request_id, model = %request.model, "starting messages stream");

        let response = self
            .base_request()
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(format!("request failed: {e}")))?;
        let response = check_status(response).await?;

        let bytes: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| Error::transport(format!("stream read failed: {e}"))),
        );
        Ok(MessageStream::spawn(bytes, &options, request_id))
    }

    fn base_request(&self) -> reqwest::RequestBuilder {
        self.http
            .post(self.config.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
    }
}

/// Maps a non-2xx response into [`Error::Http`], parsing the error body when
/// one is present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::http(status.as_u16(), &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builds_versioned_endpoint_url() {
        let config = ClientConfig::new("sk-test").base_url("http://localhost:8080/");
        assert_eq!(config.messages_url(), "http://localhost:8080/v1/messages");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn client_rejects_empty_api_key() {
        let result = Client::new(ClientConfig::new("  "));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn non_2xx_response_surfaces_structured_http_error() {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let body = r#"{"error":{"type":"not_found","message":"model not found"}}"#;
            let response = format!(
                "HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        let client = Client::new(ClientConfig::new("sk-test").base_url(format!("http://{addr}")))
            .expect("client");
        let request = MessagesRequest::new("claude-sonnet-4-5", 16).user("hi");
        let err = match client.stream_messages(&request).await {
            Ok(_) => panic!("404 response must fail the stream start"),
            Err(err) => err,
        };
        assert_eq!(
            err,
            Error::Http {
                status: 404,
                error_type: "not_found".into(),
                message: "model not found".into(),
            }
        );
    }

    #[tokio::test]
    async fn env_gated_smoke_stream_if_key_present() {
        if std::env::var("ANTHROPIC_API_KEY")
            .unwrap_or_default()
            .trim()
            .is_empty()
        {
            eprintln!("skipping live smoke test (ANTHROPIC_API_KEY missing)");
            return;
        }

        let client = Client::from_env().expect("client");
        let request = MessagesRequest::new("claude-3-5-haiku-latest", 64)
            .system("Reply with one short word.")
            .user("hello");
        let result = client
            .stream_messages(&request)
            .await
            .expect("start stream")
            .run()
            .await;
        assert!(result.is_ok(), "live smoke failed: {result:?}");
    }
}
