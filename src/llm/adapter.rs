//! Inference adapter: model lifecycle and request shaping.
//!
//! [`InferenceAdapter`] owns the backend handle and turns chat history into
//! model requests. Every failure it can observe is folded into user-facing
//! text, so callers never see a Rust error from a generation call.

use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::backend::InferenceBackend;
use super::context::{effective_context_size_tokens, user_turn_char_room};
use super::local::MistralrsBackend;
use super::prompt::{self, DEFAULT_DOCUMENT_QUESTION};
use super::types::{ChatTurn, Generation, GenerationOptions};
use crate::config::{ChatConfig, ModelConfig};
use crate::message::Message;
use crate::state::{AppState, Status};

/// Reply of a single-shot generation when no model is loaded.
pub const NOT_LOADED_REPLY: &str = "Error: AI model not loaded. Please restart the app.";

/// Only fragment of a streaming generation when no model is loaded.
pub const NOT_LOADED_FRAGMENT: &str = "Error: AI model not loaded.";

/// Text deltas of a streaming reply.
pub type ReplyStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Owns the model handle and shapes requests for it.
pub struct InferenceAdapter {
    model_config: ModelConfig,
    options: GenerationOptions,
    context_size_tokens: usize,
    document_char_budget: usize,
    summary_char_budget: usize,
    continuation_cue: String,
    backend: RwLock<Option<Arc<dyn InferenceBackend>>>,
    system_prompt: RwLock<Option<String>>,
    state: Option<Arc<AppState>>,
}

impl std::fmt::Debug for InferenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceAdapter")
            .field("model", &self.model_config.path)
            .field("ready", &self.check_connection())
            .finish()
    }
}

impl InferenceAdapter {
    /// Create an adapter for `model`. Nothing is loaded until
    /// [`initialize`](Self::initialize).
    pub fn new(model: ModelConfig, chat: &ChatConfig) -> Self {
        Self {
            options: model.generation_options(),
            context_size_tokens: effective_context_size_tokens(model.context_size_tokens),
            model_config: model,
            document_char_budget: chat.document_char_budget,
            summary_char_budget: chat.summary_char_budget,
            continuation_cue: chat.continuation_cue.clone(),
            backend: RwLock::new(None),
            system_prompt: RwLock::new(None),
            state: None,
        }
    }

    /// Use an already-constructed backend instead of loading one.
    pub fn with_backend(self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.attach_backend(backend);
        self
    }

    /// Publish loading and readiness on `state`.
    pub fn with_state(mut self, state: Arc<AppState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Install `backend` and mark the adapter ready.
    pub fn attach_backend(&self, backend: Arc<dyn InferenceBackend>) {
        info!(backend = backend.name(), "inference backend attached");
        *self.backend.write().unwrap_or_else(PoisonError::into_inner) = Some(backend);
    }

    fn backend(&self) -> Option<Arc<dyn InferenceBackend>> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, status: Status) {
        if let Some(state) = &self.state {
            state.set_status(status);
        }
    }

    /// Load the configured model file.
    ///
    /// A missing or unloadable model is logged and leaves the adapter not
    /// ready; it is never fatal. Returns the resulting readiness.
    pub async fn initialize(&self) -> bool {
        if self.check_connection() {
            self.publish(Status::Ready);
            return true;
        }
        self.publish(Status::Loading);
        match MistralrsBackend::load(&self.model_config).await {
            Ok(backend) => {
                self.attach_backend(Arc::new(backend));
                self.publish(Status::Ready);
                true
            }
            Err(e) => {
                warn!(
                    path = %self.model_config.path.display(),
                    error = %e,
                    "model unavailable, chat will answer with a not-loaded error"
                );
                self.publish(Status::Error);
                false
            }
        }
    }

    /// Whether a model is loaded.
    pub fn check_connection(&self) -> bool {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Set the instruction prepended to every request. Blank text clears it.
    pub fn set_system_prompt(&self, text: &str) {
        let value = (!text.trim().is_empty()).then(|| text.to_owned());
        *self
            .system_prompt
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// The current system prompt, if set.
    pub fn system_prompt(&self) -> Option<String> {
        self.system_prompt
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sampling options sent with every request.
    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Characters of free text a single-turn templated request may carry.
    ///
    /// `template` is the request rendered with empty free text. The system
    /// prompt and the output budget are charged against the window first,
    /// then the result is capped at `configured`.
    fn free_text_budget(&self, template: &str, configured: usize) -> usize {
        let fixed: Vec<ChatTurn> = self
            .system_prompt()
            .map(ChatTurn::system)
            .into_iter()
            .collect();
        let room = user_turn_char_room(&fixed, &self.options, self.context_size_tokens)
            .saturating_sub(template.chars().count());
        if room < configured {
            debug!(configured, room, "free text budget clamped to the context window");
        }
        room.min(configured)
    }

    /// Reply to `message` given the prior `history`.
    ///
    /// Adjacent history entries with the same role are collapsed to the
    /// first before the request is built.
    pub async fn generate(&self, message: &str, history: &[Message]) -> Generation {
        let Some(backend) = self.backend() else {
            return Generation::Error(NOT_LOADED_REPLY.to_owned());
        };
        let system_prompt = self.system_prompt();
        let turns = prompt::build_turns(system_prompt.as_deref(), history, message, true);
        debug!(turns = turns.len(), "generating reply");

        match backend.complete(&turns, &self.options).await {
            Ok(text) => Generation::Reply(text),
            Err(e) if e.is_context_overflow() => {
                warn!(error = %e, "request exceeds the model context");
                Generation::ContextLimitExceeded
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "generation failed");
                Generation::Error(format!("Error: {}", e.message()))
            }
        }
    }

    /// Stream the reply to `message` as text deltas.
    ///
    /// History is forwarded without role collapsing. A failure ends the
    /// stream after a single `"Error: …"` fragment.
    pub fn generate_stream(&self, message: &str, history: &[Message]) -> ReplyStream {
        let backend = self.backend();
        let system_prompt = self.system_prompt();
        let turns = prompt::build_turns(system_prompt.as_deref(), history, message, false);
        let options = self.options.clone();

        Box::pin(async_stream::stream! {
            match backend {
                None => {
                    yield NOT_LOADED_FRAGMENT.to_owned();
                }
                Some(backend) => match backend.stream(&turns, &options).await {
                    Err(e) => {
                        warn!(code = e.code(), error = %e, "stream failed to start");
                        yield format!("Error: {}", e.message());
                    }
                    Ok(mut inner) => {
                        while let Some(item) = inner.next().await {
                            match item {
                                Ok(delta) => {
                                    yield delta;
                                }
                                Err(e) => {
                                    warn!(code = e.code(), error = %e, "stream broke off");
                                    yield format!("Error: {}", e.message());
                                    break;
                                }
                            }
                        }
                    }
                },
            }
        })
    }

    /// Extend the last assistant answer in `history`.
    pub async fn continue_generation(&self, history: &[Message]) -> Generation {
        self.generate(&self.continuation_cue, history).await
    }

    /// Ask the model for a concise summary of `history`.
    ///
    /// The request carries no history of its own; the transcript is part
    /// of the prompt and is cut to its most recent part so the request fits
    /// the context window.
    pub async fn summarize_conversation(&self, history: &[Message]) -> Generation {
        let budget =
            self.free_text_budget(&prompt::summary_prompt(&[], 0), self.summary_char_budget);
        info!(messages = history.len(), budget, "summarizing conversation");
        let request = prompt::summary_prompt(history, budget);
        self.generate(&request, &[]).await
    }

    /// Answer `question` about a document's text.
    pub async fn analyze_document(&self, content: &str, question: Option<&str>) -> Generation {
        let question = question
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(DEFAULT_DOCUMENT_QUESTION);
        let budget = self.free_text_budget(
            &prompt::document_prompt("", question, 0),
            self.document_char_budget,
        );
        let request = prompt::document_prompt(content, question, budget);
        self.generate(&request, &[]).await
    }

    /// Describe an image from its OCR text and visual description.
    pub async fn analyze_image(&self, extracted_text: &str, description: &str) -> Generation {
        let request = prompt::image_prompt(extracted_text, description);
        self.generate(&request, &[]).await
    }

    /// Names of models available to load.
    pub fn available_models(&self) -> Vec<String> {
        if !self.model_config.path.is_file() {
            return Vec::new();
        }
        self.model_config.file_name().into_iter().collect()
    }
}
