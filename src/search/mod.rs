//! Web search collaborator
//!
//! Research and screening stages may prepend live search results to their
//! prompt. The pipeline only sees the [`SearchProvider`] trait; the Serper
//! implementation is wired up by the binary when a key is available.

pub mod serper;

pub use serper::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One organic search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Search errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search provider not configured: {0}")]
    NotConfigured(String),
    #[error("Search request failed: {0}")]
    RequestFailed(String),
    #[error("Search API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

/// Render results as the markdown block inserted into a prompt
pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    let mut block = format!("## Web search results for \"{query}\"\n");
    if results.is_empty() {
        block.push_str("\n(no results)\n");
        return block;
    }
    for (i, result) in results.iter().enumerate() {
        block.push_str(&format!(
            "\n{}. [{}]({})\n   {}\n",
            i + 1,
            result.title,
            result.url,
            result.snippet
        ));
    }
    block
}
