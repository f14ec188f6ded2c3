//! End-to-end session tests against mocked model and search backends.

use pretty_assertions::assert_eq;
use scholar_core::brain::MockLlmProvider;
use scholar_core::config::ScholarConfig;
use scholar_core::error::SearchError;
use scholar_core::insight::{CitationResolver, InsightEvent, InsightSegment, citation_numbers};
use scholar_core::language::Language;
use scholar_core::paper::Paper;
use scholar_core::research::{
    KeywordStatus, ResearchPipeline, SessionEvent, SessionState, SummaryState,
};
use scholar_core::search::{MockSearchBackend, MockSearchOutcome};
use scholar_core::types::StreamEvent;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CAFFEINE_KEYWORDS: &str = "Caffeine Sleep Quality, Caffeine Insomnia, Sleep Latency, Adenosine Receptors, Circadian Rhythm Caffeine";

fn paper(id: &str, title: &str) -> Paper {
    Paper::new(id, title).with_abstract(format!("Abstract of {title}."))
}

fn caffeine_backend() -> Arc<MockSearchBackend> {
    let backend = Arc::new(MockSearchBackend::new());
    backend.respond(
        "Caffeine Sleep Quality",
        vec![paper("a", "Evening caffeine"), paper("b", "Sleep quality")],
    );
    backend.respond(
        "Caffeine Insomnia",
        vec![paper("b", "Sleep quality"), paper("c", "Insomnia trial")],
    );
    backend.respond("Sleep Latency", vec![paper("d", "Latency study")]);
    // Two timed-out attempts, then success on the second retry.
    backend.script(
        "Adenosine Receptors",
        vec![
            MockSearchOutcome::Hang,
            MockSearchOutcome::Hang,
            MockSearchOutcome::Papers(vec![paper("e", "A2A receptors"), paper("a", "Evening caffeine")]),
        ],
    );
    backend.script(
        "Circadian Rhythm Caffeine",
        vec![
            MockSearchOutcome::Hang,
            MockSearchOutcome::Hang,
            MockSearchOutcome::Papers(vec![paper("f", "Circadian phase")]),
        ],
    );
    backend
}

fn caffeine_llm() -> Arc<MockLlmProvider> {
    let llm = Arc::new(MockLlmProvider::with_response("One-sentence summary."));
    llm.queue_response(CAFFEINE_KEYWORDS);
    llm.set_stream_script(vec![
        StreamEvent::Reasoning("Comparing trials.".into()),
        StreamEvent::Token("Caffeine delays sleep onset ".into()),
        StreamEvent::Token("<cite data-paper-id=\"d\">[1]</cite>.".into()),
    ]);
    llm
}

async fn run_collecting(
    pipeline: &ResearchPipeline,
    question: &str,
) -> (SessionState, Vec<SessionEvent>) {
    let (tx, mut rx) = mpsc::channel(256);
    let mut state = SessionState::new(question);
    let mut events = Vec::new();
    let collect = async {
        while let Some(event) = rx.recv().await {
            state.apply(&event);
            events.push(event);
        }
    };
    let (result, ()) = tokio::join!(pipeline.handle_search(question, Language::En, tx), collect);
    assert!(result.is_ok());
    (state, events)
}

#[tokio::test(start_paused = true)]
async fn test_caffeine_session_with_retries() {
    let backend = caffeine_backend();
    let pipeline =
        ResearchPipeline::from_config(&ScholarConfig::default(), caffeine_llm(), backend.clone());

    let (state, events) = run_collecting(&pipeline, "effects of caffeine on sleep").await;

    assert_eq!(state.keywords.len(), 5);
    for keyword in &state.keywords {
        assert_eq!(state.status_of(keyword), Some(KeywordStatus::Succeeded));
    }
    assert_eq!(backend.attempts("Adenosine Receptors"), 3);
    assert_eq!(backend.attempts("Sleep Latency"), 1);

    let retries: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::KeywordRetrying { keyword, retry } if keyword == "Adenosine Receptors" => {
                Some(*retry)
            }
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);
    assert!(state.retry_count_by_keyword.is_empty());

    // a..f, with "a" and "b" each returned by two keywords.
    assert_eq!(state.total_results(), 6);
    let ids: HashSet<_> = state.papers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids.len(), 6);

    // The insight only starts once every keyword has settled.
    let settled_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::SearchSettled { .. }))
        .unwrap();
    let first_insight = events
        .iter()
        .position(|e| matches!(e, SessionEvent::Insight(_)))
        .unwrap();
    assert!(settled_at < first_insight);
    assert!(events[..settled_at]
        .iter()
        .all(|e| !matches!(e, SessionEvent::Insight(_))));

    assert_eq!(state.insight.reasoning_text, "Comparing trials.");
    assert!(state.insight.done);
    assert!(state.completed);
    assert_eq!(state.error, None);

    // Every unique paper got exactly one summary.
    assert_eq!(state.ready_summaries().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_grouped_results_follow_keyword_order() {
    let pipeline =
        ResearchPipeline::from_config(&ScholarConfig::default(), caffeine_llm(), caffeine_backend());
    let state = pipeline.run("effects of caffeine on sleep", Language::En).await;

    let order: Vec<&str> = state.grouped_results().iter().map(|(k, _)| *k).collect();
    assert_eq!(
        order,
        vec![
            "Caffeine Sleep Quality",
            "Caffeine Insomnia",
            "Sleep Latency",
            "Adenosine Receptors",
            "Circadian Rhythm Caffeine",
        ]
    );
    let grouped_total: usize = state.grouped_results().iter().map(|(_, p)| p.len()).sum();
    assert_eq!(grouped_total, state.total_results());
}

#[tokio::test(start_paused = true)]
async fn test_one_keyword_http_error_does_not_block_others() {
    let llm = Arc::new(MockLlmProvider::with_response("Summary."));
    llm.queue_response("Alpha, Beta, Gamma, Delta, Epsilon");
    llm.set_stream_script(vec![StreamEvent::Token("Answer.".into())]);

    let backend = Arc::new(MockSearchBackend::new());
    backend.respond("Alpha", vec![paper("a1", "First")]);
    backend.script(
        "Beta",
        vec![MockSearchOutcome::Fail(SearchError::UpstreamSearchError {
            status: 500,
            status_text: "Internal Server Error".into(),
        })],
    );
    backend.respond("Gamma", vec![paper("g1", "Third"), paper("g2", "Third again")]);
    backend.respond("Delta", vec![paper("d1", "Fourth")]);
    backend.respond("Epsilon", vec![paper("e1", "Fifth")]);

    let pipeline = ResearchPipeline::from_config(&ScholarConfig::default(), llm, backend.clone());
    let state = pipeline.run("q", Language::En).await;

    assert_eq!(state.keywords.len(), 5);
    assert_eq!(state.status_of("Beta"), Some(KeywordStatus::Failed));
    for keyword in ["Alpha", "Gamma", "Delta", "Epsilon"] {
        assert_eq!(state.status_of(keyword), Some(KeywordStatus::Succeeded));
        assert!(!state.results_by_keyword[keyword].is_empty());
    }
    // Non-timeout errors are not retried.
    assert_eq!(backend.attempts("Beta"), 1);
    assert_eq!(state.total_results(), 5);
    assert_eq!(state.error, None);
    assert_eq!(state.insight.content_text, "Answer.");
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_the_keyword() {
    let llm = Arc::new(MockLlmProvider::new());
    llm.queue_response("Alpha");
    let backend = Arc::new(MockSearchBackend::new());
    backend.script(
        "Alpha",
        vec![
            MockSearchOutcome::Hang,
            MockSearchOutcome::Hang,
            MockSearchOutcome::Hang,
        ],
    );

    let pipeline = ResearchPipeline::from_config(&ScholarConfig::default(), llm.clone(), backend.clone());
    let state = pipeline.run("q", Language::En).await;

    assert_eq!(backend.attempts("Alpha"), 3);
    assert_eq!(state.status_of("Alpha"), Some(KeywordStatus::Failed));
    assert!(state.error.is_some());
    // No papers, so neither summaries nor the insight reached the model.
    assert_eq!(llm.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_summary_failure_is_isolated_per_paper() {
    let llm = Arc::new(MockLlmProvider::with_response("Summary."));
    llm.queue_response("Alpha");
    llm.fail_when_prompt_contains("Abstract of Broken.");
    llm.set_stream_script(vec![StreamEvent::Token("Answer.".into())]);

    let backend = Arc::new(MockSearchBackend::new());
    backend.respond(
        "Alpha",
        vec![
            paper("ok", "Fine"),
            paper("bad", "Broken"),
            Paper::new("none", "No abstract here"),
        ],
    );

    let pipeline = ResearchPipeline::from_config(&ScholarConfig::default(), llm, backend);
    let state = pipeline.run("q", Language::En).await;

    assert_eq!(
        state.summary_by_paper_id.get("ok"),
        Some(&SummaryState::Ready("Summary.".into()))
    );
    assert!(matches!(
        state.summary_by_paper_id.get("bad"),
        Some(SummaryState::Failed(_))
    ));
    assert_eq!(
        state.summary_by_paper_id.get("none"),
        Some(&SummaryState::NoAbstract)
    );
    assert!(state.insight.done);
}

#[tokio::test(start_paused = true)]
async fn test_insight_skipped_without_real_abstracts() {
    let llm = Arc::new(MockLlmProvider::with_response("unused"));
    llm.queue_response("Alpha");
    let backend = Arc::new(MockSearchBackend::new());
    backend.respond(
        "Alpha",
        vec![
            Paper::new("x", "Untitled"),
            Paper::new("y", "Placeholder").with_abstract("No abstract available"),
        ],
    );

    let pipeline = ResearchPipeline::from_config(&ScholarConfig::default(), llm.clone(), backend);
    let (state, events) = run_collecting(&pipeline, "q").await;

    assert_eq!(state.total_results(), 2);
    assert!(events.iter().all(|e| !matches!(e, SessionEvent::Insight(_))));
    assert!(!state.insight.done);
    // The keyword call is the only model request.
    assert_eq!(llm.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_streamed_citations_resolve_against_session_papers() {
    let pipeline =
        ResearchPipeline::from_config(&ScholarConfig::default(), caffeine_llm(), caffeine_backend());
    let state = pipeline.run("effects of caffeine on sleep", Language::En).await;

    let resolver = CitationResolver::new(&state.papers, Language::En);
    let segments = resolver.segments(&state.insight.content_text);

    let citation = segments
        .iter()
        .find_map(|s| match s {
            InsightSegment::Citation { label, action } => Some((label.clone(), action.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(citation.0, "[1]");
    assert_eq!(citation.1.paper_id, "d");
    assert_eq!(citation.1.anchor, "paper-d");
}

#[tokio::test(start_paused = true)]
async fn test_insight_prompt_numbers_follow_keyword_order() {
    let llm = Arc::new(MockLlmProvider::with_response("Summary."));
    llm.queue_response("Alpha, Beta");
    llm.set_stream_script(vec![StreamEvent::Token("Answer.".into())]);

    let backend = Arc::new(MockSearchBackend::new());
    backend.script(
        "Alpha",
        vec![MockSearchOutcome::Delayed(
            Duration::from_secs(3),
            vec![Paper::new("bare", "No abstract"), paper("a1", "Slow keyword")],
        )],
    );
    backend.respond("Beta", vec![paper("b1", "Fast keyword")]);

    let pipeline = ResearchPipeline::from_config(&ScholarConfig::default(), llm.clone(), backend);
    let state = pipeline.run("q", Language::En).await;

    // Beta settled first, but the prompt lists Alpha's paper first.
    assert_eq!(state.papers[0].id, "b1");
    let insight_request = llm
        .requests()
        .into_iter()
        .find(|r| r.messages.iter().any(|m| m.content.starts_with("Research question:")))
        .unwrap();
    let prompt = &insight_request.messages[1].content;
    assert!(prompt.contains("1. Slow keyword\nID: a1"));
    assert!(prompt.contains("2. Fast keyword\nID: b1"));
    assert!(!prompt.contains("ID: bare"));

    let numbers = citation_numbers(&state.papers_in_keyword_order());
    assert_eq!(numbers["a1"], 1);
    assert_eq!(numbers["b1"], 2);
    assert!(!numbers.contains_key("bare"));
}

#[tokio::test(start_paused = true)]
async fn test_phase_change_precedes_content_events() {
    let pipeline =
        ResearchPipeline::from_config(&ScholarConfig::default(), caffeine_llm(), caffeine_backend());
    let (_, events) = run_collecting(&pipeline, "effects of caffeine on sleep").await;

    let insight: Vec<&InsightEvent> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Insight(i) => Some(i),
            _ => None,
        })
        .collect();
    assert_eq!(insight[0], &InsightEvent::reasoning("Comparing trials."));
    assert_eq!(insight[1], &InsightEvent::PhaseChange);
    assert_eq!(
        insight.iter().filter(|e| ***e == InsightEvent::PhaseChange).count(),
        1
    );
}
