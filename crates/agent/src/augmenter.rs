//! Retrieval augmentation — wraps the user's question in web search context.
//!
//! On success with at least one result the prompt becomes a fixed template
//! carrying every result's title, link and snippet. Any retrieval failure,
//! or an empty result list, leaves the question untouched.

use std::sync::Arc;

use sagechat_core::retrieval::{MAX_SEARCH_RESULTS, SearchProvider, SearchResult};
use tracing::{debug, warn};

/// Builds the prompt sent to the primary model.
pub struct RetrievalAugmenter {
    search: Option<Arc<dyn SearchProvider>>,
}

impl RetrievalAugmenter {
    pub fn new(search: Option<Arc<dyn SearchProvider>>) -> Self {
        Self { search }
    }

    /// An augmenter with no search backend; always returns the raw query.
    pub fn disabled() -> Self {
        Self { search: None }
    }

    pub fn is_available(&self) -> bool {
        self.search.is_some()
    }

    /// Produce the prompt for `query`.
    ///
    /// Never fails: retrieval errors degrade to the raw query. Cancellation is
    /// handled by the caller dropping this future.
    pub async fn augment(&self, query: &str) -> String {
        let Some(search) = &self.search else {
            debug!("No search backend configured, using raw query");
            return query.to_string();
        };

        match search.search(query).await {
            Ok(results) if results.is_empty() => {
                debug!(search = search.name(), "Search returned no results, using raw query");
                query.to_string()
            }
            Ok(mut results) => {
                results.truncate(MAX_SEARCH_RESULTS);
                debug!(search = search.name(), count = results.len(), "Augmenting prompt");
                format_prompt(query, &results)
            }
            Err(e) => {
                warn!(search = search.name(), error = %e, "Search failed, using raw query");
                query.to_string()
            }
        }
    }
}

/// Render the augmented prompt.
///
/// Deterministic: the same query and results always give the same text.
pub fn format_prompt(query: &str, results: &[SearchResult]) -> String {
    let context = results
        .iter()
        .take(MAX_SEARCH_RESULTS)
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{n}] 标题: {title}\n链接: {link}\n摘要: {snippet}\n",
                n = i + 1,
                title = r.title,
                link = r.link,
                snippet = r.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("---\n");

    format!(
        "以下是关于\"{query}\"的网络搜索结果：\n\n{context}\n\
         请仅根据以上搜索结果，对用户的问题\"{query}\"进行全面的回答。\n\
         要求：\n\
         1. 只使用搜索结果中的信息，不要编造内容；\n\
         2. 引用信息时注明来源编号和链接；\n\
         3. 用通俗易懂的语言解释，必要时举例说明。"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingSearch, StaticSearch};

    fn result(i: usize) -> SearchResult {
        SearchResult {
            title: format!("NLU 简介 {i}"),
            link: format!("https://example.com/nlu/{i}"),
            snippet: format!("自然语言理解的第{i}个要点"),
        }
    }

    #[tokio::test]
    async fn failure_returns_raw_query() {
        let augmenter = RetrievalAugmenter::new(Some(Arc::new(FailingSearch)));
        assert_eq!(augmenter.augment("为什么NLU重要").await, "为什么NLU重要");
    }

    #[tokio::test]
    async fn empty_results_return_raw_query() {
        let augmenter = RetrievalAugmenter::new(Some(Arc::new(StaticSearch::new(vec![]))));
        assert_eq!(augmenter.augment("q").await, "q");
    }

    #[tokio::test]
    async fn disabled_returns_raw_query() {
        let augmenter = RetrievalAugmenter::disabled();
        assert!(!augmenter.is_available());
        assert_eq!(augmenter.augment("q").await, "q");
    }

    #[tokio::test]
    async fn results_are_embedded() {
        let search = StaticSearch::new(vec![result(1), result(2)]);
        let augmenter = RetrievalAugmenter::new(Some(Arc::new(search)));
        let prompt = augmenter.augment("NLU").await;

        assert!(prompt.contains("以下是关于\"NLU\"的网络搜索结果"));
        assert!(prompt.contains("标题: NLU 简介 1"));
        assert!(prompt.contains("链接: https://example.com/nlu/2"));
        assert!(prompt.contains("摘要: 自然语言理解的第2个要点"));
        assert!(prompt.contains("注明来源"));
    }

    #[tokio::test]
    async fn at_most_five_results_used() {
        let search = StaticSearch::new((1..=7).map(result).collect());
        let augmenter = RetrievalAugmenter::new(Some(Arc::new(search)));
        let prompt = augmenter.augment("NLU").await;
        assert!(prompt.contains("https://example.com/nlu/5"));
        assert!(!prompt.contains("https://example.com/nlu/6"));
    }

    #[test]
    fn template_is_deterministic() {
        let results = vec![result(1)];
        assert_eq!(format_prompt("q", &results), format_prompt("q", &results));
    }
}
