//! Tavily web-search client

use crate::capabilities::{CapabilityError, SearchCapability, SearchHit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "Tavily";

#[derive(Serialize, Debug)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'static str,
    max_results: usize,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize, Debug)]
struct SearchResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

/// HTTP client for the Tavily search API
pub struct TavilyClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TavilyClient {
    /// Create a client using a shared HTTP client
    pub fn new(http: reqwest::Client, api_key: &str, base_url: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SearchCapability for TavilyClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, CapabilityError> {
        if self.api_key.is_empty() {
            return Err(CapabilityError::MissingApiKey(PROVIDER));
        }

        let url = format!("{}/search", self.base_url);
        tracing::debug!(url = %url, query = %query, max_results, "Calling Tavily search");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SearchRequest {
                query,
                search_depth: "advanced",
                max_results,
            })
            .send()
            .await
            .map_err(|e| CapabilityError::Transport {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;

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
                "Tavily API returned error status"
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
        let parsed: SearchResponse =
            serde_json::from_str(&response_body).map_err(|e| CapabilityError::InvalidResponse {
                provider: PROVIDER,
                detail: format!("{} - Response body: {}", e, response_body),
            })?;

        let hits: Vec<SearchHit> = parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.content,
                score: r.score,
            })
            .collect();

        tracing::debug!(hits = hits.len(), "Tavily search returned");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_search_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_header("authorization", "Bearer tvly-key")
            .match_body(Matcher::Json(json!({
                "query": "rust async runtimes",
                "search_depth": "advanced",
                "max_results": 2
            })))
            .with_status(200)
            .with_body(
                r#"{"results": [
                    {"title": "Tokio", "url": "https://tokio.rs", "content": "An async runtime", "score": 0.9},
                    {"title": "smol", "url": "https://github.com/smol-rs/smol", "content": "A small runtime"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = TavilyClient::new(reqwest::Client::new(), "tvly-key", &server.url());
        let hits = client.search("rust async runtimes", 2).await.unwrap();

        mock.assert_async().await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://tokio.rs");
        assert_eq!(hits[0].score, Some(0.9));
        assert_eq!(hits[1].score, None);
    }

    #[tokio::test]
    async fn test_search_truncates_to_max_results() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .with_status(200)
            .with_body(
                r#"{"results": [
                    {"title": "a", "url": "https://a.example", "content": "a"},
                    {"title": "b", "url": "https://b.example", "content": "b"},
                    {"title": "c", "url": "https://c.example", "content": "c"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = TavilyClient::new(reqwest::Client::new(), "tvly-key", &server.url());
        let hits = client.search("anything", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_missing_key() {
        let client = TavilyClient::new(reqwest::Client::new(), "", "http://127.0.0.1:1");
        let result = client.search("anything", 3).await;
        assert!(matches!(result, Err(CapabilityError::MissingApiKey("Tavily"))));
    }

    #[tokio::test]
    async fn test_search_rate_limited() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = TavilyClient::new(reqwest::Client::new(), "tvly-key", &server.url());
        let err = client.search("anything", 3).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_search_malformed_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .with_status(200)
            .with_body(r#"{"results": "nope"}"#)
            .create_async()
            .await;

        let client = TavilyClient::new(reqwest::Client::new(), "tvly-key", &server.url());
        let err = client.search("anything", 3).await.unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidResponse { .. }));
    }
}
