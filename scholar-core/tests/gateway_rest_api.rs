//! Integration tests for the gateway REST API endpoints.

use axum::body::Body;
use scholar_core::brain::MockLlmProvider;
use scholar_core::config::ScholarConfig;
use scholar_core::error::{LlmError, SearchError};
use scholar_core::gateway::{AppState, gateway_router};
use scholar_core::insight::{InsightEvent, NdjsonDecoder};
use scholar_core::paper::Paper;
use scholar_core::search::{MockSearchBackend, MockSearchOutcome};
use scholar_core::types::StreamEvent;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    llm: Arc<MockLlmProvider>,
    search: Arc<MockSearchBackend>,
}

impl Harness {
    fn new() -> Self {
        Self {
            llm: Arc::new(MockLlmProvider::new()),
            search: Arc::new(MockSearchBackend::new()),
        }
    }

    fn app(&self) -> axum::Router {
        let config = ScholarConfig::default();
        let state = AppState::new(&config, self.llm.clone(), self.search.clone());
        gateway_router(state, &config.gateway)
    }
}

fn make_request(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn make_post_request(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(
    app: axum::Router,
    req: axum::http::Request<Body>,
) -> (axum::http::StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
        .await
        .unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

async fn send_json(
    app: axum::Router,
    req: axum::http::Request<Body>,
) -> (axum::http::StatusCode, serde_json::Value) {
    let (status, _, body) = send(app, req).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

// --- /api/generate-keywords ---

#[tokio::test]
async fn test_generate_keywords_returns_list() {
    let h = Harness::new();
    h.llm.queue_response(
        "Caffeine Sleep Quality, Caffeine Insomnia, Sleep Latency, Adenosine Receptors, Circadian Rhythm Caffeine, Extra",
    );
    let (status, json) = send_json(
        h.app(),
        make_post_request(
            "/api/generate-keywords",
            serde_json::json!({"prompt": "effects of caffeine on sleep"}),
        ),
    )
    .await;

    assert_eq!(status, 200);
    let keywords = json["keywords"].as_array().unwrap();
    assert_eq!(keywords.len(), 5);
    assert_eq!(keywords[1], "Caffeine Insomnia");
}

#[tokio::test]
async fn test_generate_keywords_model_failure_is_500() {
    let h = Harness::new();
    h.llm.queue_error(LlmError::HttpStatus {
        status: 502,
        message: "bad gateway".into(),
    });
    let (status, json) = send_json(
        h.app(),
        make_post_request("/api/generate-keywords", serde_json::json!({"prompt": "q"})),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(json["error"], "Failed to generate keywords");
}

#[tokio::test]
async fn test_generate_keywords_empty_prompt_is_400() {
    let h = Harness::new();
    let (status, _) = send_json(
        h.app(),
        make_post_request("/api/generate-keywords", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(h.llm.request_count(), 0);
}

// --- /api/semanticsearch ---

#[tokio::test]
async fn test_semantic_search_requires_query() {
    let h = Harness::new();
    let (status, json) = send_json(h.app(), make_request("/api/semanticsearch")).await;
    assert_eq!(status, 400);
    assert_eq!(json["error"], "Query parameter is required");
}

#[tokio::test]
async fn test_semantic_search_pagination_fields() {
    let h = Harness::new();
    h.search.respond(
        "caffeine",
        vec![
            Paper::new("a", "Caffeine and sleep").with_abstract("x"),
            Paper::new("b", "Adenosine"),
        ],
    );
    let (status, json) = send_json(
        h.app(),
        make_request("/api/semanticsearch?query=caffeine&offset=10"),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["articles"].as_array().unwrap().len(), 2);
    assert_eq!(json["articles"][0]["id"], "a");
    assert_eq!(json["hasMore"], false);
    // Default limit is 10.
    assert_eq!(json["nextOffset"], 20);
}

#[tokio::test]
async fn test_semantic_search_upstream_error_is_500() {
    let h = Harness::new();
    h.search.script(
        "caffeine",
        vec![MockSearchOutcome::Fail(SearchError::UpstreamSearchError {
            status: 503,
            status_text: "Service Unavailable".into(),
        })],
    );
    let (status, json) =
        send_json(h.app(), make_request("/api/semanticsearch?query=caffeine")).await;
    assert_eq!(status, 500);
    assert!(json["error"].as_str().unwrap().contains("503"));
}

// --- /api/summary ---

#[tokio::test]
async fn test_summary_mixed_outcomes() {
    let h = Harness::new();
    h.llm.set_default_response("Caffeine late in the day shortens sleep.");
    h.llm.fail_when_prompt_contains("poisoned abstract");

    let (status, json) = send_json(
        h.app(),
        make_post_request(
            "/api/summary",
            serde_json::json!({"papers": [
                {"paperId": "p1", "title": "A", "abstract": "Caffeine trial."},
                {"paperId": "p2", "title": "B"},
                {"paperId": "p3", "title": "C", "abstract": "poisoned abstract"},
                {"paperId": "p4", "title": "D", "abstract": "No abstract provided"}
            ]}),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["status"], "success");
    let summaries = json["summaries"].as_array().unwrap();
    assert_eq!(summaries.len(), 4);
    assert_eq!(summaries[0]["id"], "p1");
    assert_eq!(
        summaries[0]["summary"],
        "Caffeine late in the day shortens sleep."
    );
    assert!(summaries[1]["summary"].is_null());
    assert!(summaries[1].get("error").is_none());
    assert!(summaries[2]["summary"].is_null());
    assert!(summaries[2]["error"].is_string());
    assert!(summaries[3]["summary"].is_null());
}

#[tokio::test]
async fn test_summary_requires_papers() {
    let h = Harness::new();
    let (status, json) = send_json(
        h.app(),
        make_post_request("/api/summary", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(json["error"], "Papers array is required");
}

#[tokio::test]
async fn test_summary_rejects_oversized_batch() {
    let h = Harness::new();
    let papers: Vec<_> = (0..11)
        .map(|i| serde_json::json!({"paperId": format!("p{i}"), "abstract": "a"}))
        .collect();
    let (status, _) = send_json(
        h.app(),
        make_post_request("/api/summary", serde_json::json!({ "papers": papers })),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(h.llm.request_count(), 0);
}

// --- /api/generate-insight ---

#[tokio::test]
async fn test_generate_insight_streams_ndjson() {
    let h = Harness::new();
    h.llm.set_stream_script(vec![
        StreamEvent::Reasoning("Weighing the trials.".into()),
        StreamEvent::Token("Caffeine delays sleep ".into()),
        StreamEvent::Token("<cite data-paper-id=\"a\">[1]</cite>.".into()),
    ]);

    let (status, headers, body) = send(
        h.app(),
        make_post_request(
            "/api/generate-insight",
            serde_json::json!({
                "question": "effects of caffeine on sleep",
                "papers": [{"paperId": "a", "title": "Caffeine", "abstract": "Trial."}],
                "language": "en"
            }),
        ),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(headers["content-type"], "application/x-ndjson");

    let mut decoder = NdjsonDecoder::new();
    let events = decoder.push(&body);
    assert_eq!(
        events,
        vec![
            InsightEvent::reasoning("Weighing the trials."),
            InsightEvent::PhaseChange,
            InsightEvent::content("Caffeine delays sleep "),
            InsightEvent::content("<cite data-paper-id=\"a\">[1]</cite>."),
        ]
    );
}

#[tokio::test]
async fn test_generate_insight_upstream_failure_is_500() {
    let h = Harness::new();
    h.llm.fail_streaming_with(LlmError::HttpStatus {
        status: 429,
        message: "quota".into(),
    });
    let (status, json) = send_json(
        h.app(),
        make_post_request(
            "/api/generate-insight",
            serde_json::json!({
                "question": "q",
                "papers": [{"paperId": "a", "abstract": "Trial."}],
                "language": "zh"
            }),
        ),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(json["error"], "无法生成研究洞察");
}

#[tokio::test]
async fn test_generate_insight_without_abstracts_is_empty() {
    let h = Harness::new();
    let (status, _, body) = send(
        h.app(),
        make_post_request(
            "/api/generate-insight",
            serde_json::json!({
                "question": "q",
                "papers": [{"paperId": "a", "abstract": "No abstract provided"}]
            }),
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body.is_empty());
    assert_eq!(h.llm.request_count(), 0);
}

// --- /api/translate ---

#[tokio::test]
async fn test_translate_defaults_to_chinese_and_caches() {
    let h = Harness::new();
    h.llm.set_default_response("咖啡因对睡眠的影响");
    let app = h.app();

    for _ in 0..2 {
        let (status, json) = send_json(
            app.clone(),
            make_post_request(
                "/api/translate",
                serde_json::json!({"text": "Effects of caffeine on sleep"}),
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(json["translation"], "咖啡因对睡眠的影响");
        assert_eq!(json["originalText"], "Effects of caffeine on sleep");
    }
    assert_eq!(h.llm.request_count(), 1);
    assert!(h.llm.requests()[0].messages[0].content.contains("Chinese"));
}

#[tokio::test]
async fn test_translate_requires_text() {
    let h = Harness::new();
    let (status, _) = send_json(
        h.app(),
        make_post_request("/api/translate", serde_json::json!({"targetLang": "en"})),
    )
    .await;
    assert_eq!(status, 400);
}

// --- /health ---

#[tokio::test]
async fn test_health() {
    let h = Harness::new();
    let (status, json) = send_json(h.app(), make_request("/health")).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
}
