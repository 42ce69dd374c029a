//! Deterministic backend that replays scripted responses.
//!
//! Used by tests and offline demos. Every request is recorded so callers
//! can assert on exactly what the adapter sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::backend::{InferenceBackend, TextStream};
use super::context::check_fits;
use super::error::InferenceError;
use super::types::{ChatTurn, GenerationOptions};

/// A request captured by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Turns sent to the backend.
    pub turns: Vec<ChatTurn>,
    /// Options sent with them.
    pub options: GenerationOptions,
    /// Whether the request came through the streaming path.
    pub streaming: bool,
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Result<String, InferenceError>>,
    requests: Vec<RecordedRequest>,
}

/// Backend that answers from a queue of canned responses.
///
/// When the queue is empty it replies with `"ok"`. With
/// [`gated`](Self::gated) each request waits until [`release`](Self::release)
/// is called, which lets tests observe a generation in flight. With
/// [`with_context_window`](Self::with_context_window) oversized requests are
/// rejected the same way the local backend rejects them.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Semaphore>>,
    context_size_tokens: Option<usize>,
}

impl ScriptedBackend {
    /// Create a backend with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend whose requests block until released.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Reject requests that do not fit `tokens` of context. A rejected
    /// request is recorded but consumes no scripted response.
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_size_tokens = Some(tokens);
        self
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        self.push(Ok(text.into()))
    }

    /// Queue a failure.
    pub fn push_error(&self, err: InferenceError) -> &Self {
        self.push(Err(err))
    }

    fn push(&self, response: Result<String, InferenceError>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.responses.push_back(response);
        }
        self
    }

    /// Let one blocked request proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests().pop()
    }

    async fn next(
        &self,
        turns: &[ChatTurn],
        options: &GenerationOptions,
        streaming: bool,
    ) -> Result<String, InferenceError> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| InferenceError::GenerationFailed(e.to_string()))?;
            permit.forget();
        }
        let mut script = self
            .script
            .lock()
            .map_err(|e| InferenceError::GenerationFailed(format!("script poisoned: {e}")))?;
        script.requests.push(RecordedRequest {
            turns: turns.to_vec(),
            options: options.clone(),
            streaming,
        });
        if let Some(window) = self.context_size_tokens {
            check_fits(turns, options, window)?;
        }
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_owned()))
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        options: &GenerationOptions,
    ) -> Result<String, InferenceError> {
        self.next(turns, options, false).await
    }

    /// Streams the scripted reply word by word (whitespace kept with the
    /// preceding word).
    async fn stream(
        &self,
        turns: &[ChatTurn],
        options: &GenerationOptions,
    ) -> Result<TextStream, InferenceError> {
        let text = self.next(turns, options, true).await?;
        let fragments: Vec<Result<String, InferenceError>> = text
            .split_inclusive(' ')
            .map(|w| Ok(w.to_owned()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(fragments)))
    }
}
