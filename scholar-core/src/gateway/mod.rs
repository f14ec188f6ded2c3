//! # HTTP Gateway
//!
//! Exposes each pipeline stage as a JSON route so a browser client can run a
//! session itself: keyword generation, paged literature search, batch
//! summaries, the NDJSON insight stream, and translation.

pub mod api;
mod server;

pub use api::{
    InsightRequest, KeywordsRequest, KeywordsResponse, SearchResponse, SummaryItem,
    SummaryResponse, TranslateRequest, TranslateResponse,
};
pub use server::{AppState, router as gateway_router, run as run_gateway};
