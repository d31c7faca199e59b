//! Response data model shared by the streaming and single-shot paths.

/// Token accounting for a response.
///
/// During streaming, later `message_delta` events overwrite whichever fields
/// they carry; counters are never summed within one stream.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    /// Tokens consumed by the request.
    #[serde(default)]
    pub input_tokens: u64,
    /// Tokens produced by the response.
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens written to the prompt cache, when caching was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    /// Tokens served from the prompt cache, when caching was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    /// Service tier the request was billed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
}

/// One ordered element of a message's `content` array.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text output.
    Text { text: String },
    /// Extended thinking output with its verification signature.
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    /// Thinking the server withheld; opaque payload.
    RedactedThinking { data: String },
    /// A client-side tool invocation requested by the model.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// A tool invocation routed through an MCP server.
    McpToolUse {
        id: String,
        name: String,
        server_name: String,
        input: serde_json::Value,
    },
    /// A tool the server executes itself (for example web search).
    ServerToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Result supplied for an earlier `tool_use` block.
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Result of an MCP tool invocation.
    McpToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Result of a server-side web search.
    WebSearchToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
    },
    /// Result of server-side code execution.
    CodeExecutionToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
    },
    /// A file uploaded into a code-execution container.
    ContainerUpload { file_id: String },
    /// Block type this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    /// Returns the text of a `text` block, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A complete response message.
///
/// In streaming mode this is only available once the terminal `message_stop`
/// event has been observed; partial accumulator state is never exposed as a
/// `Message`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Server-assigned message id.
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Always `"assistant"`.
    pub role: String,
    /// Model that produced the response.
    pub model: String,
    /// Content blocks in server-assigned index order.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Why generation stopped; absent until the stream's final delta.
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Which configured stop sequence fired, if any.
    #[serde(default)]
    pub stop_sequence: Option<String>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Usage,
    /// Code-execution container info, when one was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<serde_json::Value>,
}

impl Message {
    /// Concatenates all text blocks in order and ignores non-text blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(text);
            }
        }
        out
    }
}
