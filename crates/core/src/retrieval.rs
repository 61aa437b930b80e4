//! Retrieval trait — the web search collaborator used to augment prompts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// Upper bound on results consumed per query.
pub const MAX_SEARCH_RESULTS: usize = 5;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// A search backend: free-text query in, ranked results out.
///
/// An empty result list is a valid answer, not an error.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchResult>, RetrievalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_result_deserializes_from_endpoint_shape() {
        let json = r#"[{"title":"NLU","link":"https://example.com/nlu","snippet":"自然语言理解"}]"#;
        let results: Vec<SearchResult> = serde_json::from_str(json).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "自然语言理解");
    }
}
