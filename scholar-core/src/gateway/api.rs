//! JSON route handlers for the gateway.

use super::server::AppState;
use crate::insight::{InsightEvent, encode_line};
use crate::language::Language;
use crate::paper::Paper;
use crate::summarizer::SummaryOutcome;
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};

const DEFAULT_SEARCH_LIMIT: usize = 10;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct KeywordsRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeywordsResponse {
    pub keywords: Vec<String>,
}

/// `POST /api/generate-keywords`
pub async fn generate_keywords(
    State(state): State<AppState>,
    Json(req): Json<KeywordsRequest>,
) -> Response {
    if req.prompt.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Prompt is required");
    }
    match state.keywords.generate(&req.prompt).await {
        Ok(keywords) => Json(KeywordsResponse { keywords }).into_response(),
        Err(e) => {
            error!(error = %e, "Generate keywords failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate keywords")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub articles: Vec<Paper>,
    pub has_more: bool,
    pub next_offset: usize,
}

/// `GET /api/semanticsearch`
pub async fn semantic_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(query) = params.query.filter(|q| !q.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Query parameter is required");
    };
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let offset = params.offset.unwrap_or(0);

    match state.search.search(&query, limit, offset).await {
        Ok(page) => Json(SearchResponse {
            articles: page.papers,
            has_more: page.has_more,
            next_offset: page.next_offset,
        })
        .into_response(),
        Err(e) => {
            error!(query = %query, error = %e, "Semantic search failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub papers: Option<Vec<Paper>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SummaryItem {
    pub id: String,
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summaries: Vec<SummaryItem>,
    pub status: String,
}

/// `POST /api/summary`
pub async fn summarize(
    State(state): State<AppState>,
    Json(req): Json<SummaryRequest>,
) -> Response {
    let Some(papers) = req.papers else {
        return error_response(StatusCode::BAD_REQUEST, "Papers array is required");
    };

    let results = match state.summarizer.summarize_batch(&papers).await {
        Ok(results) => results,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let summaries = results
        .into_iter()
        .map(|(id, outcome)| match outcome {
            SummaryOutcome::Summary(text) => SummaryItem {
                id,
                summary: Some(text),
                error: None,
            },
            SummaryOutcome::NoAbstract => SummaryItem {
                id,
                summary: None,
                error: None,
            },
            SummaryOutcome::Failed(reason) => SummaryItem {
                id,
                summary: None,
                error: Some(reason),
            },
        })
        .collect();

    (
        [(header::CACHE_CONTROL, "private, max-age=3600")],
        Json(SummaryResponse {
            summaries,
            status: "success".to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct InsightRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub papers: Vec<Paper>,
    #[serde(default)]
    pub language: Language,
}

/// `POST /api/generate-insight`
///
/// Streams NDJSON. Fails with 500 only when the model rejects the request
/// before the first record; later failures end the stream early.
pub async fn generate_insight(
    State(state): State<AppState>,
    Json(req): Json<InsightRequest>,
) -> Response {
    let language = req.language;
    let (tx, mut rx) = mpsc::channel::<InsightEvent>(64);
    let synth_state = state.clone();
    let task = tokio::spawn(async move {
        synth_state
            .insight
            .stream_insight(&req.question, &req.papers, req.language, tx)
            .await
    });

    let Some(first) = rx.recv().await else {
        return match task.await {
            Ok(Ok(_)) => ndjson_response(Body::empty()),
            Ok(Err(e)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": language.insight_failed_message(),
                    "details": e.to_string(),
                })),
            )
                .into_response(),
            Err(e) => {
                error!(error = %e, "Insight task panicked");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    language.insight_failed_message(),
                )
            }
        };
    };

    let events = futures::stream::once(async move { first }).chain(ReceiverStream::new(rx));
    let body = events.filter_map(|event| async move {
        match encode_line(&event) {
            Ok(line) => Some(Ok::<_, Infallible>(Bytes::from(line))),
            Err(e) => {
                warn!(error = %e, "Dropping unencodable insight event");
                None
            }
        }
    });
    ndjson_response(Body::from_stream(body))
}

fn ndjson_response(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn default_target() -> Language {
    Language::Zh
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "targetLang", default = "default_target")]
    pub target_lang: Language,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    pub translation: String,
    pub original_text: String,
}

/// `POST /api/translate`
pub async fn translate(
    State(state): State<AppState>,
    Json(req): Json<TranslateRequest>,
) -> Response {
    if req.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No text provided for translation");
    }
    match state.translator.translate(&req.text, req.target_lang).await {
        Ok(translation) => Json(TranslateResponse {
            translation,
            original_text: req.text,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Translation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Translation failed")
        }
    }
}
