//! Outbound capabilities
//!
//! Every external collaborator sits behind a small trait with a single
//! call-and-respond contract. Calls are stateless: everything a call needs is
//! passed in, nothing is remembered between calls. The concrete clients speak
//! HTTP through a shared `reqwest::Client` (connection pooling).

pub mod error;
pub mod openai;
pub mod openai_types;
pub mod tavily;

pub use error::CapabilityError;
pub use openai::OpenAiClient;
pub use tavily::TavilyClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single completion request to the reasoning capability
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model name
    pub model: String,
    /// System instructions for this call
    pub system: String,
    /// User prompt (already carries the accumulated context)
    pub prompt: String,
    /// Ask the provider for a JSON object response
    pub json: bool,
}

/// One web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
    /// Extracted page content
    pub content: String,
    /// Relevance score, if the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A generated image
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Image location (remote URL or `data:` URL)
    pub url: String,
    /// Prompt as rewritten by the provider, if any
    pub revised_prompt: Option<String>,
}

/// LLM reasoning capability
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Run one completion and return the text content
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CapabilityError>;
}

/// Image-understanding capability
#[async_trait]
pub trait VisionCapability: Send + Sync {
    /// Describe an image according to `instruction`
    async fn describe(
        &self,
        model: &str,
        instruction: &str,
        content_type: &str,
        image: &[u8],
    ) -> Result<String, CapabilityError>;
}

/// Web-search capability
#[async_trait]
pub trait SearchCapability: Send + Sync {
    /// Search the web and return at most `max_results` hits
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchHit>, CapabilityError>;
}

/// Image-generation capability
#[async_trait]
pub trait ImageGenerationCapability: Send + Sync {
    /// Render one image from a prompt
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
    ) -> Result<GeneratedImage, CapabilityError>;
}

/// The set of capabilities the standard pipeline is built from
#[derive(Clone)]
pub struct Capabilities {
    /// LLM reasoning
    pub reasoning: Arc<dyn ReasoningCapability>,
    /// Image understanding
    pub vision: Arc<dyn VisionCapability>,
    /// Web search
    pub search: Arc<dyn SearchCapability>,
    /// Image generation
    pub images: Arc<dyn ImageGenerationCapability>,
}

impl Capabilities {
    /// Build the HTTP-backed capabilities from provider configuration
    pub fn from_config(providers: &crate::config::ProviderConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(providers.http_timeout_secs))
            .build()?;

        let openai = Arc::new(OpenAiClient::new(
            http.clone(),
            &providers.openai_api_key,
            &providers.openai_base_url,
        ));
        let tavily = Arc::new(TavilyClient::new(
            http,
            &providers.tavily_api_key,
            &providers.tavily_base_url,
        ));

        Ok(Self {
            reasoning: openai.clone(),
            vision: openai.clone(),
            search: tavily,
            images: openai,
        })
    }
}
