//! Web search used by `search` tasks.

mod duckduckgo;

pub use duckduckgo::DuckDuckGoSearch;

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::SearchHit;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Search provider returned HTTP {0}")]
    Status(u16),

    #[error("Search is disabled")]
    Disabled,
}

/// Anything that can turn a query into a ranked list of hits.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Provider that always fails. Used when the deployment has no network access.
pub struct DisabledSearch;

#[async_trait]
impl SearchProvider for DisabledSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::Disabled)
    }
}
