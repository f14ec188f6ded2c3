//! Brain module: LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait every pipeline stage talks to, plus a
//! scriptable `MockLlmProvider` used by unit and integration tests.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Role, StreamEvent, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Trait for LLM providers, supporting both full and streaming completions.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Perform a streaming completion, sending events to the channel.
    ///
    /// An `Err` returned before any event was sent means the upstream
    /// rejected the request outright (4xx/5xx).
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;

    /// Return the default model name.
    fn model_name(&self) -> &str;
}

/// A mock LLM provider for testing.
///
/// `complete` answers from a FIFO queue, then from the default response.
/// Requests whose user turn contains a registered trigger fail instead.
/// `complete_streaming` replays a scripted event sequence.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    default_response: Mutex<Option<String>>,
    failure_triggers: Mutex<Vec<String>>,
    stream_script: Mutex<Vec<StreamEvent>>,
    stream_failure: Mutex<Option<LlmError>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            default_response: Mutex::new(None),
            failure_triggers: Mutex::new(Vec::new()),
            stream_script: Mutex::new(Vec::new()),
            stream_failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always answers with the given text.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        provider.set_default_response(text);
        provider
    }

    /// Answer every otherwise-unscripted `complete` call with `text`.
    pub fn set_default_response(&self, text: &str) {
        *lock(&self.default_response) = Some(text.to_string());
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, text: &str) {
        lock(&self.responses).push_back(Ok(text.to_string()));
    }

    /// Queue a failure to be returned by the next `complete` call.
    pub fn queue_error(&self, err: LlmError) {
        lock(&self.responses).push_back(Err(err));
    }

    /// Fail any `complete` call whose user message contains `needle`.
    pub fn fail_when_prompt_contains(&self, needle: &str) {
        lock(&self.failure_triggers).push(needle.to_string());
    }

    /// Script the events the next streaming calls replay.
    pub fn set_stream_script(&self, events: Vec<StreamEvent>) {
        *lock(&self.stream_script) = events;
    }

    /// Make streaming calls fail before any event is sent.
    pub fn fail_streaming_with(&self, err: LlmError) {
        *lock(&self.stream_failure) = Some(err);
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn text_response(&self, text: String) -> CompletionResponse {
        CompletionResponse {
            text,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: self.model.clone(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn user_text(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = user_text(&request);
        lock(&self.requests).push(request);

        let triggered = lock(&self.failure_triggers)
            .iter()
            .any(|needle| prompt.contains(needle.as_str()));
        if triggered {
            return Err(LlmError::ApiRequest {
                message: "mock failure trigger matched".to_string(),
            });
        }

        let queued = lock(&self.responses).pop_front();
        match queued {
            Some(Ok(text)) => Ok(self.text_response(text)),
            Some(Err(e)) => Err(e),
            None => match lock(&self.default_response).clone() {
                Some(text) => Ok(self.text_response(text)),
                None => Err(LlmError::ApiRequest {
                    message: "mock has no scripted response".to_string(),
                }),
            },
        }
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        lock(&self.requests).push(request);

        if let Some(err) = lock(&self.stream_failure).clone() {
            return Err(err);
        }

        let script = lock(&self.stream_script).clone();
        for event in script {
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }
        let _ = tx
            .send(StreamEvent::Done {
                usage: TokenUsage::default(),
            })
            .await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
