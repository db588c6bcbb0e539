//! Error types for the pdf2nl library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`Pdf2NlError`] — **Fatal**: the pipeline cannot be constructed or run at
//!   all (missing credential, invalid configuration). Returned as
//!   `Err(Pdf2NlError)` before any remote call is attempted.
//!
//! * [`ServiceError`] — a single remote call to the parsing or conversion
//!   service failed. Carries enough shape ([`ServiceError::is_retryable`]) for
//!   the retry loop to decide whether backing off can help.
//!
//! * [`DocumentError`] — **Non-fatal**: one document failed (unreadable file,
//!   remote call exhausted its retries, artifact write error) but all other
//!   documents in the batch are fine. Stored inside
//!   [`crate::output::PipelineResult`] so callers can inspect partial success
//!   rather than losing the whole batch to one bad document.
//!
//! The separation lets callers decide their own tolerance: abort on the first
//! document failure, log and continue, or collect all errors for a post-run
//! report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2nl library.
///
/// Document-level failures use [`DocumentError`] and are stored in
/// [`crate::output::PipelineResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2NlError {
    /// A required service credential is absent.
    ///
    /// Raised at [`crate::process::Pipeline::new`] time, before any network
    /// call, so a misconfigured batch fails in microseconds instead of after
    /// the first upload.
    #[error(
        "Missing API key for the {service} service.\n\
         Set {env_var} or pass the key explicitly in the configuration."
    )]
    MissingCredential {
        service: &'static str,
        env_var: &'static str,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input path could not be enumerated (missing directory etc.).
    #[error("Failed to read input path '{path}': {detail}")]
    InputPath { path: PathBuf, detail: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single failed call to one of the two external services.
///
/// Both the parsing service and the conversion service fail in the same four
/// contract-level ways; [`ServiceError::Transport`] is added for socket-level
/// failures, which behave like timeouts for retry purposes.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ServiceError {
    /// Invalid or missing credential (HTTP 401/403). Retrying cannot help.
    #[error("authentication rejected: {detail}")]
    Auth { detail: String },

    /// Quota exhausted or backpressure (HTTP 429). Retryable after backoff;
    /// `retry_after_secs` carries a server-specified delay when present.
    #[error("rate limit exceeded")]
    RateLimit { retry_after_secs: Option<u64> },

    /// The call exceeded its deadline. Retryable.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The response arrived but could not be decoded into usable text.
    /// Non-retryable: the same request will produce the same garbage.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },

    /// Connection-level failure (DNS, reset, 5xx). Usually transient.
    #[error("transport error: {detail}")]
    Transport { detail: String },
}

impl ServiceError {
    /// Whether a retry with backoff has a realistic chance of succeeding.
    ///
    /// Auth and malformed-response errors are deterministic; repeating the
    /// identical request only burns quota.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::RateLimit { .. }
                | ServiceError::Timeout { .. }
                | ServiceError::Transport { .. }
        )
    }

    /// Map an HTTP error status + body excerpt to the right variant.
    ///
    /// 401/403 → `Auth`, 429 → `RateLimit`, 5xx → `Transport` (transient
    /// backend trouble), anything else → `MalformedResponse` (the request
    /// itself is wrong; retrying is pointless).
    pub fn from_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> Self {
        let detail = body.chars().take(200).collect::<String>();
        match status {
            401 | 403 => ServiceError::Auth { detail },
            429 => ServiceError::RateLimit { retry_after_secs },
            500..=599 => ServiceError::Transport {
                detail: format!("HTTP {status}: {detail}"),
            },
            _ => ServiceError::MalformedResponse {
                detail: format!("HTTP {status}: {detail}"),
            },
        }
    }
}

/// A non-fatal error for a single document.
///
/// Stored in [`crate::output::PipelineResult::error`] (or
/// [`crate::output::PipelineResult::persist_error`] for artifact-write
/// failures, which never invalidate an already-computed conversion). The
/// overall batch always completes with one result per input document.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The document could not be read locally (missing file, non-PDF
    /// extension, bad magic bytes). No remote call was made.
    #[error("unreadable input '{path}': {detail}")]
    Input { path: PathBuf, detail: String },

    /// The parsing service failed after all retry attempts.
    #[error("parsing failed after {attempts} attempt(s): {source}")]
    Parse {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    /// The conversion service failed after all retry attempts.
    #[error("conversion failed after {attempts} attempt(s): {source}")]
    Convert {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    /// An artifact could not be written to durable storage.
    #[error("failed to write artifact '{path}': {detail}")]
    Persist { path: PathBuf, detail: String },

    /// The batch deadline expired before this document finished.
    /// Already-completed documents keep their results.
    #[error("cancelled: batch timeout expired before this document completed")]
    Cancelled,
}
