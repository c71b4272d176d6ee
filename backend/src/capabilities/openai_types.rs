//! OpenAI-compatible API types
//!
//! Structs that mirror the chat-completions and image-generation JSON
//! formats. Only the fields this service reads or writes are modelled.

use serde::{Deserialize, Serialize};

/// Chat completion request
#[derive(Serialize, Debug)]
pub struct ChatRequest {
    /// Model name
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Optional response format (JSON mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// A single chat message
#[derive(Serialize, Debug)]
pub struct ChatMessage {
    /// "system" or "user"
    pub role: &'static str,
    /// Message content
    pub content: MessageContent,
}

/// Message content: plain text, or a list of typed parts
#[derive(Serialize, Debug)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// Multi-part content (text and images)
    Parts(Vec<ContentPart>),
}

/// A typed content part
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text part
    Text {
        /// The text
        text: String,
    },
    /// Image part
    ImageUrl {
        /// Image location
        image_url: ImageUrl,
    },
}

/// Image location for an image content part
#[derive(Serialize, Debug)]
pub struct ImageUrl {
    /// Remote URL or `data:` URL
    pub url: String,
}

/// Response format selector
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    /// "json_object" for JSON mode
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Chat completion response
#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    /// Candidate completions
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// A single completion choice
#[derive(Deserialize, Debug)]
pub struct Choice {
    /// The generated message
    pub message: ResponseMessage,
    /// Why the model stopped generating
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Generated message
#[derive(Deserialize, Debug)]
pub struct ResponseMessage {
    /// Text content
    #[serde(default)]
    pub content: Option<String>,
    /// Refusal text, if the model refused
    #[serde(default)]
    pub refusal: Option<String>,
}

/// Image generation request
#[derive(Serialize, Debug)]
pub struct ImageRequest {
    /// Model name
    pub model: String,
    /// Prompt
    pub prompt: String,
    /// Image size, e.g. "1024x1024"
    pub size: String,
    /// Number of images
    pub n: u8,
}

/// Image generation response
#[derive(Deserialize, Debug)]
pub struct ImageResponse {
    /// Generated images
    #[serde(default)]
    pub data: Vec<ImageDatum>,
}

/// A single generated image
#[derive(Deserialize, Debug)]
pub struct ImageDatum {
    /// Hosted URL
    #[serde(default)]
    pub url: Option<String>,
    /// Base64 PNG, when the provider returns inline data
    #[serde(default)]
    pub b64_json: Option<String>,
    /// Prompt as rewritten by the provider
    #[serde(default)]
    pub revised_prompt: Option<String>,
}
