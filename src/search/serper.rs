//! Serper (google.serper.dev) search provider

use super::{SearchError, SearchProvider, SearchResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const SERPER_DEFAULT_URL: &str = "https://google.serper.dev";

/// Serper web search over `POST /search`
pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>, max_results: usize) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(SearchError::NotConfigured(
                "Serper API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: SERPER_DEFAULT_URL.to_string(),
            max_results: max_results.max(1),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build search payload (pure function)
    fn build_search_payload(query: &str, max_results: usize) -> Value {
        json!({
            "q": query,
            "num": max_results,
            "gl": "us",
            "hl": "en"
        })
    }

    /// Parse organic results, skipping entries without title or link (pure function)
    fn parse_search_response(search_result: &Value, max_results: usize) -> Vec<SearchResult> {
        search_result
            .get("organic")
            .and_then(|o| o.as_array())
            .map(|organic| {
                organic
                    .iter()
                    .filter_map(|result| {
                        let title = result.get("title")?.as_str()?;
                        let link = result.get("link")?.as_str()?;
                        let snippet = result.get("snippet").and_then(|s| s.as_str()).unwrap_or("");
                        Some(SearchResult {
                            title: title.to_string(),
                            url: link.to_string(),
                            snippet: snippet.to_string(),
                        })
                    })
                    .take(max_results)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let payload = Self::build_search_payload(query, self.max_results);

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let search_result: Value = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(Self::parse_search_response(&search_result, self.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            SerperSearch::new("", 5),
            Err(SearchError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_build_search_payload() {
        let payload = SerperSearch::build_search_payload("ai note apps", 5);

        assert_eq!(payload["q"], "ai note apps");
        assert_eq!(payload["num"], 5);
        assert_eq!(payload["gl"], "us");
    }

    #[test]
    fn test_parse_search_response_empty() {
        assert!(SerperSearch::parse_search_response(&json!({}), 5).is_empty());
    }

    #[test]
    fn test_parse_search_response_skips_incomplete_entries() {
        let response = json!({
            "organic": [
                {"title": "No link"},
                {"title": "Kept", "link": "https://example.com", "snippet": "s"},
                {"title": "Also kept", "link": "https://example.org"}
            ]
        });

        let results = SerperSearch::parse_search_response(&response, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Kept");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_search_response_respects_limit() {
        let organic: Vec<Value> = (0..8)
            .map(|i| json!({"title": format!("r{i}"), "link": format!("https://e.com/{i}")}))
            .collect();
        let results = SerperSearch::parse_search_response(&json!({ "organic": organic }), 3);
        assert_eq!(results.len(), 3);
    }
}
