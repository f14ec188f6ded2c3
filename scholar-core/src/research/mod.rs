//! Research sessions: question to keywords, fan-out search, summaries and
//! the streamed insight.
//!
//! 1. **Keywords**: one model call decomposes the question.
//! 2. **Search**: one task per keyword, with per-attempt timeout and retry.
//! 3. **Summaries**: dispatched per paper as results arrive.
//! 4. **Insight**: streamed once every keyword task has settled.

pub mod orchestrator;
pub mod pipeline;
pub mod session;

pub use orchestrator::FanOutOrchestrator;
pub use pipeline::{REASONING_COLLAPSE_DELAY, ResearchPipeline};
pub use session::{
    InsightPhase, InsightState, KeywordStatus, SessionError, SessionEvent, SessionState,
    SummaryState,
};
