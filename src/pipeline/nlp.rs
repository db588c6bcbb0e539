//! Conversion-service client: markup + prompt → natural-language text.
//!
//! The remote protocol is an Anthropic-Messages-style REST API: a JSON POST
//! for blocking completion, the same request with `stream: true` for
//! server-sent-event streaming. Both modes sit behind the [`ConvertService`]
//! trait, which is the single suspension-strategy seam of the pipeline:
//!
//! * **Blocking** — `complete(...).await` suspends the caller until done.
//! * **Non-blocking/concurrent** — the orchestrator simply overlaps several
//!   of those same futures; nothing here changes.
//! * **Streaming** — `complete_stream` yields text fragments lazily; ordered
//!   concatenation equals the blocking output for the same input, and each
//!   call produces a fresh, non-restartable sequence.
//!
//! Keeping one trait instead of three code paths means the request building,
//! error mapping, and retry policy cannot drift between modes.

use crate::config::ConvertOptions;
use crate::error::{DocumentError, ServiceError};
use crate::output::ConversionResult;
use crate::prompts::render_prompt;
use crate::select::PromptVariant;
use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// A lazy, finite sequence of natural-language text fragments.
///
/// Non-restartable: once drained it is exhausted; call the streaming
/// operation again for a fresh sequence.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ServiceError>> + Send>>;

/// A completed conversion call, before pipeline-level bookkeeping.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Model identifier the service reports having used.
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// True when generation stopped at the output-token cap.
    pub truncated: bool,
}

/// The conversion service: one prompt in, natural-language text out.
#[async_trait]
pub trait ConvertService: Send + Sync {
    /// Blocking mode: resolve once the full result is available.
    async fn complete(
        &self,
        prompt: &str,
        options: &ConvertOptions,
    ) -> Result<Completion, ServiceError>;

    /// Streaming mode: a fresh fragment sequence per invocation whose ordered
    /// concatenation equals the blocking-mode text for equivalent input.
    async fn complete_stream(
        &self,
        prompt: &str,
        options: &ConvertOptions,
    ) -> Result<FragmentStream, ServiceError>;
}

// ── HTTP implementation ──────────────────────────────────────────────────

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Conversion service over HTTP (Anthropic-Messages-style wire protocol).
pub struct HttpConvertClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpConvertClient {
    pub fn new(api_key: impl Into<String>, request_timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Point the client at a different endpoint (tests, proxy gateway).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, prompt: &str, options: &ConvertOptions, stream: bool) -> reqwest::RequestBuilder {
        let body = json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        });
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::from_status(status.as_u16(), retry_after, &body))
    }
}

fn map_request_error(e: reqwest::Error, started: Instant) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    } else {
        ServiceError::Transport {
            detail: e.to_string(),
        }
    }
}

#[async_trait]
impl ConvertService for HttpConvertClient {
    async fn complete(
        &self,
        prompt: &str,
        options: &ConvertOptions,
    ) -> Result<Completion, ServiceError> {
        let started = Instant::now();
        let response = self
            .request(prompt, options, false)
            .send()
            .await
            .map_err(|e| map_request_error(e, started))?;
        let response = Self::check_status(response).await?;

        let body = response.text().await.map_err(|e| ServiceError::Transport {
            detail: e.to_string(),
        })?;
        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| ServiceError::MalformedResponse {
                detail: format!("{e}; body: {}", body.chars().take(200).collect::<String>()),
            })?;

        if parsed.content.is_empty() {
            return Err(ServiceError::MalformedResponse {
                detail: "empty content array in response".into(),
            });
        }

        let text: String = parsed
            .content
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        let truncated = parsed.stop_reason.as_deref() == Some("max_tokens");
        if truncated {
            warn!(
                "Conversion output hit the {}-token cap and may be incomplete",
                options.max_tokens
            );
        }
        debug!(
            "Conversion call: {} in / {} out tokens, {}ms",
            parsed.usage.input_tokens,
            parsed.usage.output_tokens,
            started.elapsed().as_millis()
        );

        Ok(Completion {
            text,
            model: if parsed.model.is_empty() {
                options.model.clone()
            } else {
                parsed.model
            },
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            truncated,
        })
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &ConvertOptions,
    ) -> Result<FragmentStream, ServiceError> {
        let started = Instant::now();
        let response = self
            .request(prompt, options, true)
            .send()
            .await
            .map_err(|e| map_request_error(e, started))?;
        let response = Self::check_status(response).await?;

        let (tx, rx) = mpsc::channel::<Result<String, ServiceError>>(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            // SSE lines can straddle chunk boundaries; keep a carry buffer.
            let mut buf = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ServiceError::Transport {
                                detail: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    let line = line.trim_end();
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };
                    match event["type"].as_str() {
                        Some("content_block_delta") => {
                            if let Some(text) = event["delta"]["text"].as_str() {
                                if tx.send(Ok(text.to_string())).await.is_err() {
                                    return;
                                }
                            }
                        }
                        // The stream protocol signals completion explicitly;
                        // there is no "[DONE]" sentinel.
                        Some("message_stop") => return,
                        _ => {}
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

// ── Pipeline-facing wrapper ──────────────────────────────────────────────

/// The conversion stage as the orchestrator sees it: prompt rendering plus
/// bounded retry around the service call.
pub struct NaturalLanguageConverter {
    service: Arc<dyn ConvertService>,
    options: ConvertOptions,
    custom_prompt: Option<String>,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl NaturalLanguageConverter {
    pub fn new(
        service: Arc<dyn ConvertService>,
        options: ConvertOptions,
        custom_prompt: Option<String>,
        max_retries: u32,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            service,
            options,
            custom_prompt,
            max_retries,
            retry_backoff_ms,
        }
    }

    /// Convert markup to natural language (blocking mode), retrying
    /// retryable failures per the configured policy.
    pub async fn convert(
        &self,
        markup: &str,
        variant: PromptVariant,
    ) -> Result<ConversionResult, DocumentError> {
        let prompt = render_prompt(markup, variant, self.custom_prompt.as_deref());
        info!(
            "Converting {} chars of markup with {} ({} prompt)",
            markup.len(),
            self.options.model,
            variant.as_str()
        );

        let attempts = AtomicU32::new(0);
        let completion = super::with_retries(
            self.max_retries,
            self.retry_backoff_ms,
            "convert",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.service.complete(&prompt, &self.options)
            },
        )
        .await
        .map_err(|(attempts, source)| DocumentError::Convert { attempts, source })?;

        Ok(ConversionResult {
            text: completion.text,
            model: completion.model,
            prompt_variant: variant,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            truncated: completion.truncated,
            retries: attempts.load(Ordering::SeqCst).saturating_sub(1),
        })
    }

    /// Convert markup to a fragment stream (streaming mode).
    ///
    /// Only the initial request is retried; once fragments start flowing a
    /// mid-stream failure is surfaced through the stream itself, because
    /// transparently retrying would re-emit text the caller already consumed.
    pub async fn convert_stream(
        &self,
        markup: &str,
        variant: PromptVariant,
    ) -> Result<FragmentStream, DocumentError> {
        let prompt = render_prompt(markup, variant, self.custom_prompt.as_deref());
        super::with_retries(
            self.max_retries,
            self.retry_backoff_ms,
            "convert (stream)",
            || self.service.complete_stream(&prompt, &self.options),
        )
        .await
        .map_err(|(attempts, source)| DocumentError::Convert { attempts, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyService {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ConvertService for FlakyService {
        async fn complete(
            &self,
            _prompt: &str,
            options: &ConvertOptions,
        ) -> Result<Completion, ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(ServiceError::RateLimit {
                    retry_after_secs: None,
                })
            } else {
                Ok(Completion {
                    text: "converted".into(),
                    model: options.model.clone(),
                    input_tokens: 10,
                    output_tokens: 5,
                    truncated: false,
                })
            }
        }

        async fn complete_stream(
            &self,
            _prompt: &str,
            _options: &ConvertOptions,
        ) -> Result<FragmentStream, ServiceError> {
            Ok(Box::pin(futures::stream::iter(vec![
                Ok("conv".to_string()),
                Ok("erted".to_string()),
            ])))
        }
    }

    #[tokio::test]
    async fn retries_are_recorded_in_the_result() {
        let service = Arc::new(FlakyService {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        });
        let converter = NaturalLanguageConverter::new(
            service.clone(),
            ConvertOptions::default(),
            None,
            3,
            1,
        );

        let result = converter
            .convert("# doc", PromptVariant::General)
            .await
            .unwrap();
        assert_eq!(result.text, "converted");
        assert_eq!(result.retries, 2);
        assert_eq!(result.prompt_variant, PromptVariant::General);
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempts() {
        let service = Arc::new(FlakyService {
            failures_before_success: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let converter =
            NaturalLanguageConverter::new(service, ConvertOptions::default(), None, 2, 1);

        let err = converter
            .convert("# doc", PromptVariant::Table)
            .await
            .unwrap_err();
        match err {
            DocumentError::Convert { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.is_retryable());
            }
            other => panic!("expected Convert error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_fragments_concatenate() {
        let service = Arc::new(FlakyService {
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        });
        let converter =
            NaturalLanguageConverter::new(service, ConvertOptions::default(), None, 0, 1);

        let stream = converter
            .convert_stream("# doc", PromptVariant::General)
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "converted");
    }
}
