//! Wire-level tests for the two HTTP service clients, against a local mock
//! server. These pin the request shape (paths, auth headers, body fields)
//! and the response decoding, including error-status mapping and SSE
//! fragment parsing.

use futures::StreamExt;
use pdf2nl::{
    ConvertOptions, ConvertService, HttpConvertClient, HttpParseClient, ParseOptions,
    ParseService, ServiceError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn convert_client(server: &MockServer) -> HttpConvertClient {
    HttpConvertClient::new("test-key", 30).with_base_url(server.uri())
}

fn parse_client(server: &MockServer) -> HttpParseClient {
    HttpParseClient::new("llx-test", 30)
        .with_base_url(server.uri())
        .with_poll_interval_ms(10)
}

// ── Conversion client ────────────────────────────────────────────────────

#[tokio::test]
async fn blocking_completion_decodes_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4-20250514",
            "max_tokens": 8000,
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "text", "text": "The table lists " },
                { "type": "text", "text": "two plans." }
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 120, "output_tokens": 42 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = convert_client(&server)
        .complete("Rewrite this.", &ConvertOptions::default())
        .await
        .unwrap();

    assert_eq!(completion.text, "The table lists two plans.");
    assert_eq!(completion.model, "claude-sonnet-4-20250514");
    assert_eq!(completion.input_tokens, 120);
    assert_eq!(completion.output_tokens, 42);
    assert!(!completion.truncated);
}

#[tokio::test]
async fn max_tokens_stop_reason_marks_truncation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Cut off mid-sen" }],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "max_tokens",
            "usage": { "input_tokens": 10, "output_tokens": 8000 }
        })))
        .mount(&server)
        .await;

    let completion = convert_client(&server)
        .complete("prompt", &ConvertOptions::default())
        .await
        .unwrap();
    assert!(completion.truncated);
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "error": { "message": "invalid x-api-key" } })),
        )
        .mount(&server)
        .await;

    let err = convert_client(&server)
        .complete("prompt", &ConvertOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Auth { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_json(json!({ "error": { "message": "rate limited" } })),
        )
        .mount(&server)
        .await;

    let err = convert_client(&server)
        .complete("prompt", &ConvertOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RateLimit {
            retry_after_secs: Some(7)
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn empty_content_is_a_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [],
            "model": "m",
            "usage": { "input_tokens": 1, "output_tokens": 0 }
        })))
        .mount(&server)
        .await;

    let err = convert_client(&server)
        .complete("prompt", &ConvertOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MalformedResponse { .. }));
}

#[tokio::test]
async fn sse_stream_yields_fragments_until_message_stop() {
    let sse_body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\"}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello \"}}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"world.\"}}\n",
        "\n",
        "data: {\"type\":\"message_stop\"}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"IGNORED\"}}\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut stream = convert_client(&server)
        .complete_stream("prompt", &ConvertOptions::default())
        .await
        .unwrap();

    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    assert_eq!(fragments, vec!["Hello ", "world."]);
}

// ── Parsing client ───────────────────────────────────────────────────────

#[tokio::test]
async fn upload_poll_fetch_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/parsing/upload"))
        .and(header("authorization", "Bearer llx-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-1" })))
        .expect(1)
        .mount(&server)
        .await;

    // First poll reports PENDING, the second SUCCESS.
    Mock::given(method("GET"))
        .and(path("/api/v1/parsing/job/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "PENDING" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/parsing/job/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "SUCCESS" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/parsing/job/job-1/result/markdown"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "markdown": "# Page one\n\n---\n\n# Page two",
            "job_metadata": { "job_pages": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let parsed = parse_client(&server)
        .parse("doc.pdf", b"%PDF-1.4 body".to_vec(), &ParseOptions::default())
        .await
        .unwrap();

    assert_eq!(parsed.markup, "# Page one\n\n---\n\n# Page two");
    assert_eq!(parsed.page_count, 2);
}

#[tokio::test]
async fn page_count_falls_back_to_separator_counting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/parsing/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-2" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/parsing/job/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "SUCCESS" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/parsing/job/job-2/result/markdown"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "markdown": "a\n\n---\n\nb\n\n---\n\nc"
        })))
        .mount(&server)
        .await;

    let parsed = parse_client(&server)
        .parse("doc.pdf", b"%PDF-1.4".to_vec(), &ParseOptions::default())
        .await
        .unwrap();
    assert_eq!(parsed.page_count, 3);
}

#[tokio::test]
async fn terminal_job_failure_is_not_retried_as_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/parsing/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-3" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/parsing/job/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ERROR" })))
        .expect(1)
        .mount(&server)
        .await;

    let err = parse_client(&server)
        .parse("doc.pdf", b"%PDF-1.4".to_vec(), &ParseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MalformedResponse { .. }));
}

#[tokio::test]
async fn upload_rejection_maps_by_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/parsing/upload"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = parse_client(&server)
        .parse("doc.pdf", b"%PDF-1.4".to_vec(), &ParseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Transport { .. }));
    assert!(err.is_retryable());
}
