//! HTTP search provider — calls a JSON search endpoint.
//!
//! The endpoint accepts `POST {"query": "..."}` and answers with an ordered
//! array of `{title, link, snippet}` objects.

use async_trait::async_trait;
use sagechat_core::error::RetrievalError;
use sagechat_core::retrieval::{MAX_SEARCH_RESULTS, SearchProvider, SearchResult};
use tracing::debug;

pub struct HttpSearchProvider {
    endpoint: String,
    max_results: usize,
    client: reqwest::Client,
}

impl HttpSearchProvider {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            endpoint: endpoint.into(),
            max_results: MAX_SEARCH_RESULTS,
            client,
        }
    }

    /// Cap the number of results kept per query (never above five).
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.min(MAX_SEARCH_RESULTS);
        self
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, RetrievalError> {
        debug!(endpoint = %self.endpoint, "Sending search request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| RetrievalError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Status {
                status_code: status.as_u16(),
                message,
            });
        }

        let mut results: Vec<SearchResult> = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        results.truncate(self.max_results);
        debug!(count = results.len(), "Search returned results");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hits(n: usize) -> serde_json::Value {
        (0..n)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Result {i}"),
                    "link": format!("https://example.com/{i}"),
                    "snippet": format!("snippet {i}"),
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn posts_query_and_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({"query": "NLU"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits(2)))
            .mount(&server)
            .await;

        let search = HttpSearchProvider::new(server.uri(), 5);
        let results = search.search("NLU").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].link, "https://example.com/1");
    }

    #[tokio::test]
    async fn caps_results_at_five() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits(8)))
            .mount(&server)
            .await;

        let search = HttpSearchProvider::new(server.uri(), 5).with_max_results(10);
        assert_eq!(search.search("q").await.unwrap().len(), 5);

        let search = HttpSearchProvider::new(server.uri(), 5).with_max_results(3);
        assert_eq!(search.search("q").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_array_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let search = HttpSearchProvider::new(server.uri(), 5);
        assert!(search.search("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "搜索失败"})),
            )
            .mount(&server)
            .await;

        let search = HttpSearchProvider::new(server.uri(), 5);
        let err = search.search("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Status { status_code: 500, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let search = HttpSearchProvider::new(server.uri(), 5);
        let err = search.search("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Parse(_)));
    }
}
