//! Build the configured generation and search backends.

use std::sync::Arc;

use sagechat_config::AppConfig;
use sagechat_core::provider::Provider;
use sagechat_core::retrieval::SearchProvider;

use crate::openai_compat::OpenAiCompatProvider;
use crate::search::HttpSearchProvider;

/// Build the generation provider from configuration.
pub fn build_provider(config: &AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    Arc::new(OpenAiCompatProvider::new(&config.provider, base_url, api_key))
}

/// Build the search provider, if an endpoint is configured.
pub fn build_search(config: &AppConfig) -> Option<Arc<dyn SearchProvider>> {
    let endpoint = config.search.endpoint.as_ref()?;
    let provider = HttpSearchProvider::new(endpoint, config.search.timeout_secs)
        .with_max_results(config.search.max_results);
    Some(Arc::new(provider))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "siliconflow" => "https://api.siliconflow.cn/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
