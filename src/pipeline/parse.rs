//! Parsing-service client: PDF bytes → semi-structured markup.
//!
//! The remote protocol is treated as an opaque contract: upload the document,
//! poll the job until it settles, fetch the markdown result. Everything the
//! rest of the pipeline needs is behind the [`ParseService`] trait, so tests
//! and custom transports can swap the HTTP client out entirely.

use crate::config::ParseOptions;
use crate::error::{DocumentError, ServiceError};
use crate::output::ParseResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

/// What a successful parse returns from the remote service.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub markup: String,
    /// Page count reported by the service; 0 when it reported none.
    pub page_count: usize,
}

/// The parsing service: one async call per document.
///
/// Implementations must be safe to share across concurrent per-document
/// tasks (`Send + Sync`); the pipeline holds one instance behind an `Arc`.
#[async_trait]
pub trait ParseService: Send + Sync {
    async fn parse(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        options: &ParseOptions,
    ) -> Result<ParsedDocument, ServiceError>;
}

// ── HTTP implementation ──────────────────────────────────────────────────

const DEFAULT_BASE_URL: &str = "https://api.cloud.llamaindex.ai";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MarkdownResult {
    markdown: String,
    #[serde(default)]
    job_metadata: Option<JobMetadata>,
}

#[derive(Debug, Deserialize)]
struct JobMetadata {
    #[serde(default)]
    job_pages: usize,
}

/// Parsing service over HTTP: multipart upload, job polling, result fetch.
pub struct HttpParseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Delay between job-status polls.
    poll_interval_ms: u64,
    /// Overall budget for one parse (upload + polling + result).
    deadline_secs: u64,
}

impl HttpParseClient {
    pub fn new(api_key: impl Into<String>, request_timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            poll_interval_ms: 1000,
            deadline_secs: request_timeout_secs.max(1) * 3,
        }
    }

    /// Point the client at a different endpoint (tests, self-hosted gateway).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
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

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport {
                detail: e.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|e| ServiceError::MalformedResponse {
            detail: format!("{e}; body: {}", body.chars().take(200).collect::<String>()),
        })
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

fn options_form(options: &ParseOptions) -> Vec<(&'static str, String)> {
    vec![
        ("tier", options.tier.clone()),
        ("version", options.version.clone()),
        ("high_res_ocr", options.high_res_ocr.to_string()),
        ("adaptive_long_table", options.adaptive_long_table.to_string()),
        (
            "outlined_table_extraction",
            options.outlined_table_extraction.to_string(),
        ),
        (
            "output_tables_as_HTML",
            options.output_tables_as_html.to_string(),
        ),
        (
            "precise_bounding_box",
            options.precise_bounding_box.to_string(),
        ),
        ("page_separator", options.page_separator.clone()),
        ("max_pages", options.max_pages.to_string()),
    ]
}

#[async_trait]
impl ParseService for HttpParseClient {
    async fn parse(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        options: &ParseOptions,
    ) -> Result<ParsedDocument, ServiceError> {
        let started = Instant::now();

        // ── Upload ───────────────────────────────────────────────────────
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| ServiceError::Transport {
                detail: e.to_string(),
            })?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        for (key, value) in options_form(options) {
            form = form.text(key, value);
        }

        let response = self
            .client
            .post(format!("{}/api/v1/parsing/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_request_error(e, started))?;
        let upload: UploadResponse = Self::decode(Self::check_status(response).await?).await?;
        debug!("Parse job {} created for {}", upload.id, file_name);

        // ── Poll until the job settles ───────────────────────────────────
        let deadline = Duration::from_secs(self.deadline_secs);
        loop {
            let response = self
                .client
                .get(format!("{}/api/v1/parsing/job/{}", self.base_url, upload.id))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| map_request_error(e, started))?;
            let job: JobStatus = Self::decode(Self::check_status(response).await?).await?;

            match job.status.as_str() {
                "SUCCESS" => break,
                "PENDING" => {
                    if started.elapsed() > deadline {
                        return Err(ServiceError::Timeout {
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    sleep(Duration::from_millis(self.poll_interval_ms)).await;
                }
                other => {
                    return Err(ServiceError::MalformedResponse {
                        detail: format!("parse job {} ended in status {other}", upload.id),
                    })
                }
            }
        }

        // ── Fetch the markdown result ────────────────────────────────────
        let response = self
            .client
            .get(format!(
                "{}/api/v1/parsing/job/{}/result/markdown",
                self.base_url, upload.id
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_request_error(e, started))?;
        let result: MarkdownResult = Self::decode(Self::check_status(response).await?).await?;

        let page_count = result
            .job_metadata
            .map(|m| m.job_pages)
            .filter(|&n| n > 0)
            .unwrap_or_else(|| count_pages(&result.markdown, &options.page_separator));

        info!(
            "Parsed {}: {} pages, {} chars of markup in {}ms",
            file_name,
            page_count,
            result.markdown.len(),
            started.elapsed().as_millis()
        );

        Ok(ParsedDocument {
            markup: result.markdown,
            page_count,
        })
    }
}

/// Derive a page count from separator occurrences when the service did not
/// report one.
fn count_pages(markup: &str, separator: &str) -> usize {
    if markup.is_empty() {
        return 0;
    }
    if separator.is_empty() {
        return 1;
    }
    markup.matches(separator).count() + 1
}

// ── Pipeline-facing wrapper ──────────────────────────────────────────────

/// The parse stage as the orchestrator sees it: local read + remote parse
/// with bounded retries, yielding a [`ParseResult`] or a per-document error.
pub struct DocumentParser {
    service: Arc<dyn ParseService>,
    options: ParseOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl DocumentParser {
    pub fn new(
        service: Arc<dyn ParseService>,
        options: ParseOptions,
        max_retries: u32,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            service,
            options,
            max_retries,
            retry_backoff_ms,
        }
    }

    /// Parse one document. Local read failures surface as
    /// [`DocumentError::Input`] without touching the network; remote failures
    /// are retried per the configured policy before becoming
    /// [`DocumentError::Parse`].
    pub async fn parse(&self, path: &Path) -> Result<ParseResult, DocumentError> {
        let bytes = super::input::read_document(path).await?;
        let file_name = crate::output::display_name(path);

        let parsed = super::with_retries(
            self.max_retries,
            self.retry_backoff_ms,
            &format!("parse {file_name}"),
            || self.service.parse(&file_name, bytes.clone(), &self.options),
        )
        .await
        .map_err(|(attempts, source)| DocumentError::Parse { attempts, source })?;

        Ok(ParseResult {
            markup: parsed.markup,
            page_count: parsed.page_count,
        })
    }
}
