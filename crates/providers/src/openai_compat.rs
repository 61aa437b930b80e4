//! OpenAI-compatible provider implementation.
//!
//! Works with: SiliconFlow, OpenAI, OpenRouter, DeepSeek, Ollama, vLLM,
//! Together AI, and any endpoint exposing `/chat/completions` with SSE
//! streaming.

use async_trait::async_trait;
use futures::StreamExt;
use sagechat_core::error::ProviderError;
use sagechat_core::provider::{ChunkReceiver, ProviderRequest, StreamChunk};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::sse::{ChunkDecoder, SseEvent};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        // No overall timeout: answers stream for as long as the model writes.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the JSON body for a chat completion request.
    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": request.stream,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    /// Map a non-success status to a provider error.
    async fn status_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();

        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Provider streaming error");
                ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                }
            }
        }
    }
}

/// Forward decoded events; returns false once the stream should stop.
async fn forward(
    tx: &mpsc::Sender<Result<StreamChunk, ProviderError>>,
    events: Vec<SseEvent>,
) -> bool {
    for event in events {
        let (chunk, last) = match event {
            SseEvent::Delta(text) => (StreamChunk::delta(text), false),
            SseEvent::Done => (StreamChunk::finished(), true),
        };
        if tx.send(Ok(chunk)).await.is_err() || last {
            return false;
        }
    }
    true
}

#[async_trait]
impl sagechat_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&ProviderRequest {
            stream: true,
            ..request
        });

        debug!(provider = %self.name, model = %body["model"], "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = ChunkDecoder::new();

            loop {
                // Dropping the receiver aborts the request mid-read.
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!(provider = %provider_name, "Stream receiver dropped, aborting request");
                        return;
                    }
                    next = byte_stream.next() => next,
                };

                let Some(chunk_result) = next else {
                    break;
                };

                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                if !forward(&tx, decoder.feed(&bytes)).await {
                    return;
                }
            }

            // Connection closed without [DONE]
            if forward(&tx, decoder.finish()).await {
                if decoder.skipped_frames() > 0 {
                    debug!(
                        provider = %provider_name,
                        skipped = decoder.skipped_frames(),
                        "Stream ended with unparseable frames"
                    );
                }
                let _ = tx.send(Ok(StreamChunk::finished())).await;
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}
