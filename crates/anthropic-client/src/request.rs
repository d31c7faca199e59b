//! Request body types.
//!
//! These are deliberately thin serialization shells: the client performs no
//! request-side validation beyond what serialization requires, and callers
//! remain responsible for supplying a well-formed request.

use crate::errors::Error;

/// Who authored a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn in a request.
///
/// `content` accepts either a plain string or an array of content blocks,
/// mirroring what the API accepts.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageParam {
    pub role: Role,
    pub content: serde_json::Value,
}

impl MessageParam {
    /// Creates a plain-text user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: serde_json::Value::String(text.into()),
        }
    }

    /// Creates an assistant turn from arbitrary content.
    pub fn assistant(content: serde_json::Value) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }
}

/// Body for a messages request.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<MessageParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
    /// Additional body fields passed through verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessagesRequest {
    /// Creates a request with the required fields and no turns.
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            messages: Vec::new(),
            system: None,
            temperature: None,
            stop_sequences: None,
            tools: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Appends a plain-text user turn.
    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.messages.push(MessageParam::user(text));
        self
    }

    /// Sets the system prompt.
    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system = Some(text.into());
        self
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the tool definitions, passed through verbatim.
    pub fn tools(mut self, tools: serde_json::Value) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Serializes the body, setting the `stream` flag for streaming requests.
    pub(crate) fn to_body(&self, stream: bool) -> Result<serde_json::Value, Error> {
        let mut body = serde_json::to_value(self)
            .map_err(|e| Error::config(format!("failed to serialize request body: {e}")))?;
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
        }
        Ok(body)
    }
}
