//! # Scholar Core
//!
//! Core library for Scholar, a question-to-insight literature research
//! pipeline. Provides the LLM interface (brain), keyword generation, the
//! throttled literature search client, fan-out orchestration with
//! deduplication, per-paper summaries, the streamed cited insight,
//! translation, configuration, and the HTTP gateway.

pub mod brain;
pub mod config;
pub mod error;
pub mod gateway;
pub mod insight;
pub mod keywords;
pub mod language;
pub mod paper;
pub mod providers;
pub mod research;
pub mod search;
pub mod summarizer;
pub mod translation;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{ScholarConfig, load_config};
pub use error::{LlmError, PipelineError, Result, ScholarError, SearchError};
pub use insight::{CitationResolver, InsightEvent, InsightSegment, InsightSynthesizer};
pub use keywords::KeywordGenerator;
pub use language::Language;
pub use paper::{Paper, PaperId};
pub use research::{
    FanOutOrchestrator, KeywordStatus, ResearchPipeline, SessionEvent, SessionState,
    SummaryState,
};
pub use search::{SearchBackend, SearchPage, SemanticScholarClient};
pub use summarizer::{Summarizer, SummaryOutcome};
pub use translation::{TranslationCache, TranslationOverlay, Translator};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StreamEvent, TokenUsage};
