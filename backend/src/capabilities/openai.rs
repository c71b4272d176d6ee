//! OpenAI-compatible API client
//!
//! Direct HTTP client for the chat-completions and image-generation
//! endpoints. One client backs three capabilities: reasoning (text or JSON
//! mode), vision (image content parts) and image generation.

use crate::capabilities::openai_types::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageRequest, ImageResponse, ImageUrl,
    MessageContent, ResponseFormat,
};
use crate::capabilities::{
    CapabilityError, CompletionRequest, GeneratedImage, ImageGenerationCapability,
    ReasoningCapability, VisionCapability,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Serialize};

const PROVIDER: &str = "OpenAI";

/// HTTP client for an OpenAI-compatible API
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client using a shared HTTP client (connection pooling)
    pub fn new(http: reqwest::Client, api_key: &str, base_url: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, CapabilityError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        if self.api_key.is_empty() {
            return Err(CapabilityError::MissingApiKey(PROVIDER));
        }

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "Calling OpenAI API");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());

            tracing::error!(
                status_code = status_code,
                error_body = %error_body,
                "OpenAI API returned error status"
            );

            if status_code == 429 {
                return Err(CapabilityError::RateLimited {
                    provider: PROVIDER,
                    body: error_body,
                });
            }
            return Err(CapabilityError::Status {
                provider: PROVIDER,
                status: status_code,
                body: error_body,
            });
        }

        let response_body = response.text().await.map_err(|e| CapabilityError::Transport {
            provider: PROVIDER,
            detail: format!("failed to read response body: {}", e),
        })?;

        serde_json::from_str(&response_body).map_err(|e| CapabilityError::InvalidResponse {
            provider: PROVIDER,
            detail: format!("{} - Response body: {}", e, response_body),
        })
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, CapabilityError> {
        let parsed: ChatResponse = self.post_json("/chat/completions", request).await?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CapabilityError::EmptyResponse {
                provider: PROVIDER,
                detail: "response contains no choices".to_string(),
            })?;

        if let Some(refusal) = choice.message.refusal {
            return Err(CapabilityError::Blocked {
                provider: PROVIDER,
                reason: refusal,
            });
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(CapabilityError::Blocked {
                provider: PROVIDER,
                reason: "content_filter".to_string(),
            });
        }

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(CapabilityError::EmptyResponse {
                provider: PROVIDER,
                detail: "response text is empty".to_string(),
            });
        }

        tracing::debug!(
            model = %request.model,
            response_len = text.len(),
            "Successfully received response from OpenAI API"
        );
        Ok(text)
    }
}

#[async_trait]
impl ReasoningCapability for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CapabilityError> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: MessageContent::Text(request.system.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: MessageContent::Text(request.prompt.clone()),
        });

        tracing::debug!(
            model = %request.model,
            json = request.json,
            prompt_len = request.prompt.len(),
            "Requesting completion"
        );

        self.chat(&ChatRequest {
            model: request.model.clone(),
            messages,
            response_format: request.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        })
        .await
    }
}

#[async_trait]
impl VisionCapability for OpenAiClient {
    async fn describe(
        &self,
        model: &str,
        instruction: &str,
        content_type: &str,
        image: &[u8],
    ) -> Result<String, CapabilityError> {
        let data_url = format!("data:{};base64,{}", content_type, STANDARD.encode(image));

        tracing::debug!(
            model = %model,
            image_bytes = image.len(),
            "Requesting image description"
        );

        self.chat(&ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: instruction.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            }],
            response_format: None,
        })
        .await
    }
}

#[async_trait]
impl ImageGenerationCapability for OpenAiClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
    ) -> Result<GeneratedImage, CapabilityError> {
        let request = ImageRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            size: size.to_string(),
            n: 1,
        };
        let parsed: ImageResponse = self.post_json("/images/generations", &request).await?;

        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CapabilityError::EmptyResponse {
                provider: PROVIDER,
                detail: "image response contains no data".to_string(),
            })?;

        let url = match (datum.url, datum.b64_json) {
            (Some(url), _) if !url.is_empty() => url,
            (_, Some(b64)) if !b64.is_empty() => format!("data:image/png;base64,{}", b64),
            _ => {
                return Err(CapabilityError::EmptyResponse {
                    provider: PROVIDER,
                    detail: "image has neither url nor b64_json".to_string(),
                })
            }
        };

        Ok(GeneratedImage {
            url,
            revised_prompt: datum.revised_prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn request(json: bool) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_string(),
            system: "You are a test".to_string(),
            prompt: "test prompt".to_string(),
            json,
        }
    }

    fn client(server: &Server) -> OpenAiClient {
        OpenAiClient::new(reqwest::Client::new(), "test-key", &server.url())
    }

    #[tokio::test]
    async fn test_complete_empty_api_key() {
        let client = OpenAiClient::new(reqwest::Client::new(), "", "http://127.0.0.1:1");
        let result = client.complete(&request(false)).await;
        assert!(matches!(result, Err(CapabilityError::MissingApiKey(_))));
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are a test"},
                    {"role": "user", "content": "test prompt"}
                ]
            })))
            .with_status(200)
            .with_body(
                r#"{"choices": [{"message": {"role": "assistant", "content": "This is a test response"}, "finish_reason": "stop"}]}"#,
            )
            .create_async()
            .await;

        let result = client(&server).complete(&request(false)).await;

        mock.assert_async().await;
        assert_eq!(result.unwrap(), "This is a test response");
    }

    #[tokio::test]
    async fn test_complete_json_mode() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_body(
                r#"{"choices": [{"message": {"content": "{\"tasks\": []}"}, "finish_reason": "stop"}]}"#,
            )
            .create_async()
            .await;

        let result = client(&server).complete(&request(true)).await;

        mock.assert_async().await;
        assert!(result.unwrap().contains("\"tasks\""));
    }

    #[tokio::test]
    async fn test_complete_empty_choices() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let result = client(&server).complete(&request(false)).await;

        mock.assert_async().await;
        assert!(result.unwrap_err().to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_complete_refusal() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(
                r#"{"choices": [{"message": {"content": null, "refusal": "I can't help with that"}}]}"#,
            )
            .create_async()
            .await;

        let result = client(&server).complete(&request(false)).await;
        assert!(matches!(result, Err(CapabilityError::Blocked { .. })));
    }

    #[tokio::test]
    async fn test_complete_rate_limit() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "Rate limit exceeded"}}"#)
            .create_async()
            .await;

        let result = client(&server).complete(&request(false)).await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let result = client(&server).complete(&request(false)).await;
        match result {
            Err(CapabilityError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("Expected Status error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_invalid_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("This is not JSON")
            .create_async()
            .await;

        let result = client(&server).complete(&request(false)).await;

        mock.assert_async().await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse OpenAI response"));
    }

    #[tokio::test]
    async fn test_describe_sends_image_part() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(
                r#""image_url":\{"url":"data:image/png;base64,aW1n"\}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "A bar chart"}}]}"#)
            .create_async()
            .await;

        let result = client(&server)
            .describe("gpt-4o", "Describe this image", "image/png", b"img")
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap(), "A bar chart");
    }

    #[tokio::test]
    async fn test_generate_image_url() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/images/generations")
            .match_body(Matcher::PartialJson(json!({
                "model": "dall-e-3",
                "prompt": "a line chart",
                "size": "1024x1024",
                "n": 1
            })))
            .with_status(200)
            .with_body(
                r#"{"data": [{"url": "https://images.example/chart.png", "revised_prompt": "a tidy line chart"}]}"#,
            )
            .create_async()
            .await;

        let image = client(&server)
            .generate("dall-e-3", "a line chart", "1024x1024")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(image.url, "https://images.example/chart.png");
        assert_eq!(image.revised_prompt.as_deref(), Some("a tidy line chart"));
    }

    #[tokio::test]
    async fn test_generate_image_inline_data() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/images/generations")
            .with_status(200)
            .with_body(r#"{"data": [{"b64_json": "iVBORw0"}]}"#)
            .create_async()
            .await;

        let image = client(&server)
            .generate("gpt-image-1", "a pie chart", "1024x1024")
            .await
            .unwrap();
        assert_eq!(image.url, "data:image/png;base64,iVBORw0");
    }
}
