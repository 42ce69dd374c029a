//! Conversation controller state machine.
//!
//! ```text
//! Idle ──submit──▶ AwaitingResponse ──reply──▶ Idle
//!                        │
//!                        └─context limit──▶ ContextLimitRecovery ──reply──▶ Idle
//! ```
//!
//! Every method takes `&self`; state lives behind a mutex that is never
//! held across an await. Entering a non-idle phase is guarded, so a call
//! arriving while another is in flight is ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::events::ChatEvent;
use crate::llm::{Generation, InferenceAdapter};
use crate::message::{ConversationId, Message, MessageId};
use crate::notify::Notifier;
use crate::state::{AppState, Status};
use crate::store::{MessageStore, StoreError};

/// Where the controller is in its turn cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Ready for input.
    #[default]
    Idle,
    /// Waiting for the model to answer a submit or continue.
    AwaitingResponse,
    /// Summarizing the conversation after a context overflow.
    ContextLimitRecovery,
}

/// Result of [`ConversationController::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Empty input, or another turn is in flight. Nothing changed.
    Ignored,
    /// The assistant message was appended.
    Replied(Message),
    /// The context was restarted from a summary before replying.
    Recovered(Message),
    /// The turn could not complete; the text was shown as an error bubble.
    Failed(String),
}

/// Result of [`ConversationController::continue_last`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinueOutcome {
    /// Nothing to continue, or another turn is in flight.
    Ignored,
    /// The last answer was extended in place.
    Extended(Message),
    /// The model failed; the answer is unchanged.
    Failed(String),
}

/// Join a partial answer and its continuation.
///
/// Trailing whitespace of `existing` is dropped and a blank line separates
/// the parts. An empty `existing` yields `addition` unchanged.
pub fn concat_continuation(existing: &str, addition: &str) -> String {
    let base = existing.trim_end();
    if base.is_empty() {
        addition.to_owned()
    } else {
        format!("{base}\n\n{addition}")
    }
}

#[derive(Debug, Default)]
struct Inner {
    phase: Phase,
    messages: Vec<Message>,
    /// Id of the answer "continue" extends.
    continue_target: Option<MessageId>,
}

/// Resets the phase to idle when a turn ends, including when its future
/// is dropped mid-flight.
struct PhaseGuard<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase = Phase::Idle;
    }
}

/// Sequences the turns of one conversation.
pub struct ConversationController {
    conversation_id: ConversationId,
    adapter: Arc<InferenceAdapter>,
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
    state: Arc<AppState>,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationController")
            .field("conversation_id", &self.conversation_id)
            .field("phase", &self.phase())
            .finish()
    }
}

impl ConversationController {
    /// Create a controller with an empty in-memory history.
    pub fn new(
        conversation_id: ConversationId,
        adapter: Arc<InferenceAdapter>,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            conversation_id,
            adapter,
            store,
            notifier,
            state,
            events: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Emit [`ChatEvent`]s on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ChatEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Conversation this controller drives.
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Snapshot of the in-memory history.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Whether "continue" would act right now.
    pub fn can_continue(&self) -> bool {
        let inner = self.lock();
        inner.phase == Phase::Idle && inner.continue_target.is_some()
    }

    /// Replace the in-memory history with what the store holds.
    ///
    /// # Errors
    ///
    /// Returns the store error; the in-memory history is left unchanged.
    pub async fn load_messages(&self) -> Result<usize, StoreError> {
        let messages = self.store.get_messages(self.conversation_id).await?;
        let count = messages.len();
        let mut inner = self.lock();
        inner.messages = messages;
        inner.continue_target = None;
        debug!(conversation_id = self.conversation_id, count, "history loaded");
        Ok(count)
    }

    /// Forget the in-memory history and the continue target.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.messages.clear();
        inner.continue_target = None;
    }

    /// Send `text` as a user message and wait for the reply.
    pub async fn submit(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }
        let Some(_guard) = self.begin(|_| true) else {
            debug!("submit ignored, a turn is already in flight");
            return TurnOutcome::Ignored;
        };

        match self.run_turn(text).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "chat turn failed");
                let shown = format!("Error: {e}");
                self.emit(ChatEvent::Error(shown.clone()));
                TurnOutcome::Failed(shown)
            }
        }
    }

    /// Extend the last assistant answer with more model output.
    pub async fn continue_last(&self) -> ContinueOutcome {
        let Some(_guard) = self.begin(|inner| inner.continue_target.is_some()) else {
            return ContinueOutcome::Ignored;
        };
        let (history, target, id) = {
            let inner = self.lock();
            let Some(id) = inner.continue_target else {
                return ContinueOutcome::Ignored;
            };
            let Some(target) = inner.messages.iter().position(|m| m.id == Some(id)) else {
                return ContinueOutcome::Ignored;
            };
            (inner.messages.clone(), target, id)
        };

        let generation = self
            .generate_with_status(self.adapter.continue_generation(&history))
            .await;
        let addition = match generation {
            Generation::Reply(text) => text,
            Generation::Error(text) => return self.continue_failed(text),
            Generation::ContextLimitExceeded => {
                return self.continue_failed(self.state.translate("context_limit_error"));
            }
        };

        let mut updated = history[target].clone();
        updated.content = concat_continuation(&updated.content, &addition);
        if let Err(e) = self.store.update_message(id, &updated.content).await {
            error!(id, error = %e, "failed to persist continued answer");
            return self.continue_failed(format!("Error: {e}"));
        }

        // The history may have been reloaded while the model was running.
        if let Some(slot) = self
            .lock()
            .messages
            .iter_mut()
            .find(|m| m.id == Some(id))
        {
            slot.content = updated.content.clone();
        }
        info!(chars = updated.content.chars().count(), "answer continued");
        self.emit(ChatEvent::AssistantUpdated(updated.clone()));
        ContinueOutcome::Extended(updated)
    }

    fn continue_failed(&self, text: String) -> ContinueOutcome {
        warn!(error = %text, "continue failed, answer left unchanged");
        self.emit(ChatEvent::Error(text.clone()));
        ContinueOutcome::Failed(text)
    }

    async fn run_turn(&self, text: &str) -> Result<TurnOutcome, StoreError> {
        let history = {
            let mut inner = self.lock();
            inner.continue_target = None;
            inner.messages.clone()
        };

        let user = self
            .store
            .add_message(Message::user(self.conversation_id, text))
            .await?;
        self.lock().messages.push(user.clone());
        self.emit(ChatEvent::UserMessage(user.clone()));

        match self.generate_with_status(self.adapter.generate(text, &history)).await {
            Generation::ContextLimitExceeded => self.recover(text, user).await,
            generation => Ok(TurnOutcome::Replied(self.finish_turn(generation).await?)),
        }
    }

    /// Summarize the conversation, restart it from the summary and reissue
    /// the user's message against that single root.
    async fn recover(&self, text: &str, user: Message) -> Result<TurnOutcome, StoreError> {
        self.lock().phase = Phase::ContextLimitRecovery;
        warn!(
            conversation_id = self.conversation_id,
            "context limit reached, restarting from a summary"
        );
        self.emit(ChatEvent::UserMessageDiscarded(user));

        let history = self.messages();
        let summary = match self
            .generate_with_status(self.adapter.summarize_conversation(&history))
            .await
        {
            Generation::Reply(summary) => summary,
            other => {
                let shown = other
                    .text()
                    .map(str::to_owned)
                    .unwrap_or_else(|| self.state.translate("context_limit_error"));
                error!(error = %shown, "summary failed, conversation kept as is");
                self.emit(ChatEvent::Error(shown.clone()));
                return Ok(TurnOutcome::Failed(shown));
            }
        };

        self.store
            .clear_conversation_messages(self.conversation_id)
            .await?;
        {
            let mut inner = self.lock();
            inner.messages.clear();
            inner.continue_target = None;
        }
        let root_text = format!(
            "{}\n\n{}\n\n{}",
            self.state.translate("summary_banner"),
            summary.trim(),
            self.state.translate("conversation_continues")
        );
        let root = self
            .store
            .add_message(Message::assistant(self.conversation_id, root_text))
            .await?;
        self.lock().messages = vec![root.clone()];
        self.emit(ChatEvent::ContextReset(root.clone()));

        let generation = self
            .generate_with_status(self.adapter.generate(text, std::slice::from_ref(&root)))
            .await;
        let reply = self.finish_turn(generation).await?;
        info!(conversation_id = self.conversation_id, "context restarted");
        Ok(TurnOutcome::Recovered(reply))
    }

    /// Persist the assistant message for `generation` and notify.
    async fn finish_turn(&self, generation: Generation) -> Result<Message, StoreError> {
        let content = match generation {
            Generation::Reply(text) | Generation::Error(text) => text,
            Generation::ContextLimitExceeded => self.state.translate("context_limit_error"),
        };
        let saved = self
            .store
            .add_message(Message::assistant(self.conversation_id, content))
            .await?;
        {
            let mut inner = self.lock();
            inner.messages.push(saved.clone());
            inner.continue_target = saved.id;
        }
        self.emit(ChatEvent::AssistantMessage(saved.clone()));
        self.notifier.show_local_notification(
            &self.state.translate("notification_title"),
            &self.state.translate("notification_body"),
        );
        Ok(saved)
    }

    async fn generate_with_status(
        &self,
        request: impl std::future::Future<Output = Generation>,
    ) -> Generation {
        self.emit(ChatEvent::Thinking);
        self.state.set_status(Status::Generating);
        let generation = request.await;
        self.state.set_status(Status::Ready);
        self.emit(ChatEvent::ThinkingDone);
        generation
    }

    /// Move from idle to awaiting a response if `ready` holds.
    fn begin(&self, ready: impl FnOnce(&Inner) -> bool) -> Option<PhaseGuard<'_>> {
        let mut inner = self.lock();
        if inner.phase != Phase::Idle || !ready(&inner) {
            return None;
        }
        inner.phase = Phase::AwaitingResponse;
        Some(PhaseGuard { inner: &self.inner })
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::{ChatConfig, ModelConfig};
    use crate::llm::context::estimate_prompt_tokens;
    use crate::llm::{ChatTurn, InferenceError, NOT_LOADED_REPLY, ScriptedBackend};
    use crate::message::{MessageId, Role};
    use crate::notify::{ChannelNotifier, NoopNotifier, Notification};
    use crate::store::{MemoryStore, Settings};

    struct Harness {
        controller: Arc<ConversationController>,
        backend: ScriptedBackend,
        store: MemoryStore,
        state: Arc<AppState>,
        events: mpsc::UnboundedReceiver<ChatEvent>,
    }

    fn adapter(backend: Option<&ScriptedBackend>) -> Arc<InferenceAdapter> {
        let model = ModelConfig {
            path: PathBuf::from("/nonexistent/model.gguf"),
            ..ModelConfig::default()
        };
        let adapter = InferenceAdapter::new(model, &ChatConfig::default());
        Arc::new(match backend {
            Some(b) => adapter.with_backend(Arc::new(b.clone())),
            None => adapter,
        })
    }

    fn harness_with(backend: ScriptedBackend) -> Harness {
        let store = MemoryStore::new();
        let state = AppState::shared();
        let (tx, events) = mpsc::unbounded_channel();
        let controller = ConversationController::new(
            1,
            adapter(Some(&backend)),
            Arc::new(store.clone()),
            Arc::new(NoopNotifier),
            Arc::clone(&state),
        )
        .with_events(tx);
        Harness {
            controller: Arc::new(controller),
            backend,
            store,
            state,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedBackend::new())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn concatenation_law() {
        assert_eq!(concat_continuation("x  \n", "y"), "x\n\ny");
        assert_eq!(concat_continuation("", "y"), "y");
        assert_eq!(concat_continuation("   ", "y"), "y");
    }

    #[tokio::test]
    async fn empty_submit_is_ignored() {
        let h = harness();
        assert_eq!(h.controller.submit("   \n").await, TurnOutcome::Ignored);
        assert!(h.controller.messages().is_empty());
        assert!(h.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn submit_persists_both_sides_and_sends_prior_history() {
        let h = harness();
        h.backend.push_reply("first answer").push_reply("second answer");

        h.controller.submit("hello").await;
        let outcome = h.controller.submit("  again ").await;

        let TurnOutcome::Replied(reply) = outcome else {
            unreachable!("expected a reply, got {outcome:?}");
        };
        assert_eq!(reply.content, "second answer");

        let stored = h.store.get_messages(1).await.unwrap();
        let texts: Vec<_> = stored.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["hello", "first answer", "again", "second answer"]);
        assert_eq!(h.controller.messages(), stored);

        let sent = h.backend.last_request().unwrap().turns;
        assert_eq!(
            sent,
            vec![
                ChatTurn::user("hello"),
                ChatTurn::assistant("first answer"),
                ChatTurn::user("again"),
            ]
        );
        assert_eq!(h.state.status(), Status::Ready);
    }

    #[tokio::test]
    async fn events_bracket_the_generation() {
        let mut h = harness();
        h.backend.push_reply("hi there");
        h.controller.submit("hi").await;

        let events = drain(&mut h.events);
        assert!(matches!(events[0], ChatEvent::UserMessage(ref m) if m.content == "hi"));
        assert_eq!(events[1], ChatEvent::Thinking);
        assert_eq!(events[2], ChatEvent::ThinkingDone);
        assert!(matches!(events[3], ChatEvent::AssistantMessage(ref m) if m.content == "hi there"));
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn generation_error_is_persisted_as_assistant_text() {
        let h = harness();
        h.backend
            .push_error(InferenceError::GenerationFailed("boom".into()));
        let outcome = h.controller.submit("q").await;
        assert!(matches!(outcome, TurnOutcome::Replied(ref m) if m.content == "Error: boom"));
        assert_eq!(h.store.get_messages(1).await.unwrap()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn not_ready_model_answers_with_fixed_text() {
        let store = MemoryStore::new();
        let controller = ConversationController::new(
            1,
            adapter(None),
            Arc::new(store.clone()),
            Arc::new(NoopNotifier),
            AppState::shared(),
        );
        let outcome = controller.submit("anything").await;
        assert!(matches!(outcome, TurnOutcome::Replied(ref m) if m.content == NOT_LOADED_REPLY));
    }

    #[tokio::test]
    async fn reentrant_submit_is_a_no_op() {
        let h = harness_with(ScriptedBackend::gated());
        h.backend.push_reply("slow answer");

        let controller = Arc::clone(&h.controller);
        let first = tokio::spawn(async move { controller.submit("first").await });
        while h.backend.requests().is_empty() && h.controller.phase() == Phase::Idle {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.controller.phase(), Phase::AwaitingResponse);
        assert_eq!(h.state.status(), Status::Generating);

        assert_eq!(h.controller.submit("second").await, TurnOutcome::Ignored);
        assert_eq!(h.controller.continue_last().await, ContinueOutcome::Ignored);
        assert_eq!(h.controller.messages().len(), 1);

        h.backend.release();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Replied(_)));
        assert_eq!(h.controller.phase(), Phase::Idle);
        assert_eq!(h.store.get_messages(1).await.unwrap().len(), 2);
        assert_eq!(h.backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn dropped_submit_returns_to_idle() {
        let h = harness_with(ScriptedBackend::gated());
        let controller = Arc::clone(&h.controller);
        let task = tokio::spawn(async move { controller.submit("stuck").await });
        while h.controller.phase() == Phase::Idle {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        assert_eq!(h.controller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn context_limit_restarts_from_summary() {
        let mut h = harness();
        h.backend.push_reply("a1").push_reply("a2");
        h.controller.submit("q1").await;
        h.controller.submit("q2").await;
        drain(&mut h.events);

        h.backend
            .push_error(InferenceError::ContextOverflow("too long".into()))
            .push_reply("  they discussed q1 and q2  ")
            .push_reply("fresh answer");
        let outcome = h.controller.submit("q3").await;

        let TurnOutcome::Recovered(reply) = outcome else {
            unreachable!("expected recovery, got {outcome:?}");
        };
        assert_eq!(reply.content, "fresh answer");

        let root_text = "📝 Summary of the previous conversation:\n\n\
                         they discussed q1 and q2\n\n\
                         --- The conversation continues ---";
        let messages = h.controller.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, root_text);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[1], reply);
        assert_eq!(h.store.get_messages(1).await.unwrap(), messages);

        // The summary request saw the whole history, including the new message.
        let requests = h.backend.requests();
        let summary_request = &requests[requests.len() - 2].turns;
        assert_eq!(summary_request.len(), 1);
        assert!(summary_request[0].content.contains("user: q3"));

        // The reissued request carries exactly the summary as history.
        let reissued = &requests[requests.len() - 1].turns;
        assert_eq!(
            reissued,
            &vec![ChatTurn::assistant(root_text), ChatTurn::user("q3")]
        );

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| {
            matches!(e, ChatEvent::UserMessageDiscarded(m) if m.content == "q3")
        }));
        assert!(events.iter().any(|e| {
            matches!(e, ChatEvent::ContextReset(m) if m.content == root_text)
        }));
        assert!(h.controller.can_continue());
    }

    #[tokio::test]
    async fn failed_summary_keeps_the_conversation() {
        let h = harness();
        h.backend
            .push_reply("a1")
            .push_error(InferenceError::ContextOverflow("too long".into()))
            .push_error(InferenceError::GenerationFailed("summary crashed".into()));
        h.controller.submit("q1").await;
        let outcome = h.controller.submit("q2").await;

        assert_eq!(outcome, TurnOutcome::Failed("Error: summary crashed".into()));
        let stored = h.store.get_messages(1).await.unwrap();
        let texts: Vec<_> = stored.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["q1", "a1", "q2"]);
        assert_eq!(h.controller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn failed_restart_leaves_memory_matching_the_store() {
        let backend = ScriptedBackend::new();
        backend
            .push_reply("a1")
            .push_error(InferenceError::ContextOverflow("too long".into()))
            .push_reply("recap");
        let store = Arc::new(FlakyStore::new());
        let controller = ConversationController::new(
            1,
            adapter(Some(&backend)),
            Arc::clone(&store) as Arc<dyn MessageStore>,
            Arc::new(NoopNotifier),
            AppState::shared(),
        );
        controller.submit("q1").await;

        store.fail_adds_after_clear.store(true, Ordering::SeqCst);
        let outcome = controller.submit("q2").await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed("Error: I/O error: disk full".into())
        );
        assert!(store.inner.get_messages(1).await.unwrap().is_empty());
        assert!(controller.messages().is_empty());
        assert!(!controller.can_continue());

        store.fail_adds_after_clear.store(false, Ordering::SeqCst);
        store.fail_adds.store(false, Ordering::SeqCst);
        controller.submit("q3").await;
        assert_eq!(backend.last_request().unwrap().turns, vec![ChatTurn::user("q3")]);
        assert_eq!(controller.messages(), store.inner.get_messages(1).await.unwrap());
    }

    #[tokio::test]
    async fn reload_during_continue_leaves_other_messages_alone() {
        let h = harness_with(ScriptedBackend::gated());
        h.backend.push_reply("answer").push_reply("more");
        h.backend.release();
        h.controller.submit("q").await;

        let controller = Arc::clone(&h.controller);
        let task = tokio::spawn(async move { controller.continue_last().await });
        while h.controller.phase() == Phase::Idle {
            tokio::task::yield_now().await;
        }

        h.store.clear_conversation_messages(1).await.unwrap();
        h.store.add_message(Message::user(1, "other q")).await.unwrap();
        h.store
            .add_message(Message::assistant(1, "other a"))
            .await
            .unwrap();
        h.controller.load_messages().await.unwrap();

        h.backend.release();
        let outcome = task.await.unwrap();
        assert!(matches!(outcome, ContinueOutcome::Failed(_)));
        assert_eq!(h.controller.messages()[1].content, "other a");
        assert_eq!(h.store.get_messages(1).await.unwrap()[1].content, "other a");
    }

    #[tokio::test]
    async fn detected_overflow_recovers_within_the_default_window() {
        let window = ModelConfig::default().context_size_tokens;
        let h = harness_with(ScriptedBackend::new().with_context_window(window));
        for i in 0..10 {
            h.store
                .add_message(Message::user(1, format!("{i} {}", "q".repeat(400))))
                .await
                .unwrap();
            h.store
                .add_message(Message::assistant(1, format!("{i} {}", "a".repeat(400))))
                .await
                .unwrap();
        }
        h.controller.load_messages().await.unwrap();
        h.backend.push_reply("recap").push_reply("fresh answer");

        let outcome = h.controller.submit("one more").await;
        assert!(matches!(outcome, TurnOutcome::Recovered(ref m) if m.content == "fresh answer"));

        let requests = h.backend.requests();
        assert_eq!(requests.len(), 3);
        let tokens = |r: &crate::llm::RecordedRequest| {
            estimate_prompt_tokens(&r.turns) + r.options.max_tokens
        };
        assert!(tokens(&requests[0]) > window);
        assert!(requests[1..].iter().all(|r| tokens(r) <= window));

        let messages = h.controller.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("recap"));
        assert_eq!(h.store.get_messages(1).await.unwrap(), messages);
    }

    #[tokio::test]
    async fn continue_concatenates_repeatedly() {
        let mut h = harness();
        h.backend
            .push_reply("x  ")
            .push_reply("y1")
            .push_reply("y2")
            .push_reply("y3");
        h.controller.submit("tell me").await;
        assert!(h.controller.can_continue());

        for _ in 0..3 {
            let outcome = h.controller.continue_last().await;
            assert!(matches!(outcome, ContinueOutcome::Extended(_)));
        }

        let messages = h.controller.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "x\n\ny1\n\ny2\n\ny3");
        assert_eq!(
            h.store.get_messages(1).await.unwrap()[1].content,
            "x\n\ny1\n\ny2\n\ny3"
        );
        assert!(h.controller.can_continue());

        let updates = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, ChatEvent::AssistantUpdated(_)))
            .count();
        assert_eq!(updates, 3);
    }

    #[tokio::test]
    async fn continue_from_empty_answer_is_just_the_addition() {
        let h = harness();
        h.backend.push_reply("").push_reply("y");
        h.controller.submit("q").await;
        h.controller.continue_last().await;
        assert_eq!(h.controller.messages()[1].content, "y");
    }

    #[tokio::test]
    async fn continue_error_leaves_answer_unchanged() {
        let mut h = harness();
        h.backend
            .push_reply("partial")
            .push_error(InferenceError::GenerationFailed("nope".into()));
        h.controller.submit("q").await;
        drain(&mut h.events);

        let outcome = h.controller.continue_last().await;
        assert_eq!(outcome, ContinueOutcome::Failed("Error: nope".into()));
        assert_eq!(h.controller.messages()[1].content, "partial");
        assert_eq!(h.store.get_messages(1).await.unwrap()[1].content, "partial");
        assert!(h.controller.can_continue());
        assert!(drain(&mut h.events).contains(&ChatEvent::Error("Error: nope".into())));
    }

    #[tokio::test]
    async fn continue_without_target_is_ignored() {
        let h = harness();
        assert_eq!(h.controller.continue_last().await, ContinueOutcome::Ignored);
        assert!(h.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn fresh_submit_moves_continue_to_the_new_answer() {
        let h = harness();
        h.backend
            .push_reply("first")
            .push_reply("second")
            .push_reply("more");
        h.controller.submit("a").await;
        h.controller.submit("b").await;
        h.controller.continue_last().await;

        let messages = h.controller.messages();
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[3].content, "second\n\nmore");
    }

    struct FlakyStore {
        inner: MemoryStore,
        fail_adds: AtomicBool,
        /// Start failing adds once a conversation has been cleared.
        fail_adds_after_clear: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_adds: AtomicBool::new(false),
                fail_adds_after_clear: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl MessageStore for FlakyStore {
        async fn get_messages(&self, id: ConversationId) -> Result<Vec<Message>, StoreError> {
            self.inner.get_messages(id).await
        }
        async fn add_message(&self, message: Message) -> Result<Message, StoreError> {
            if self.fail_adds.load(Ordering::SeqCst) {
                return Err(StoreError::Io("disk full".into()));
            }
            self.inner.add_message(message).await
        }
        async fn update_message(&self, id: MessageId, content: &str) -> Result<(), StoreError> {
            self.inner.update_message(id, content).await
        }
        async fn clear_conversation_messages(&self, id: ConversationId) -> Result<(), StoreError> {
            self.inner.clear_conversation_messages(id).await?;
            if self.fail_adds_after_clear.load(Ordering::SeqCst) {
                self.fail_adds.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
        async fn clear_all_messages(&self) -> Result<(), StoreError> {
            self.inner.clear_all_messages().await
        }
        async fn get_settings(&self) -> Result<Settings, StoreError> {
            self.inner.get_settings().await
        }
        async fn update_settings(&self, settings: &Settings) -> Result<(), StoreError> {
            self.inner.update_settings(settings).await
        }
    }

    #[tokio::test]
    async fn store_failure_shows_error_and_clears_continue() {
        let backend = ScriptedBackend::new();
        backend.push_reply("answer");
        let store = Arc::new(FlakyStore::new());
        let (tx, mut events) = mpsc::unbounded_channel();
        let controller = ConversationController::new(
            1,
            adapter(Some(&backend)),
            Arc::clone(&store) as Arc<dyn MessageStore>,
            Arc::new(NoopNotifier),
            AppState::shared(),
        )
        .with_events(tx);

        controller.submit("q").await;
        assert!(controller.can_continue());
        drain(&mut events);

        store.fail_adds.store(true, Ordering::SeqCst);
        let outcome = controller.submit("q2").await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed("Error: I/O error: disk full".into())
        );
        assert!(!controller.can_continue());
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(
            drain(&mut events),
            vec![ChatEvent::Error("Error: I/O error: disk full".into())]
        );
    }

    #[tokio::test]
    async fn every_reply_is_announced() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let backend = ScriptedBackend::new();
        let controller = ConversationController::new(
            1,
            adapter(Some(&backend)),
            Arc::new(MemoryStore::new()),
            Arc::new(notifier),
            AppState::shared(),
        );
        controller.submit("one").await;
        controller.submit("two").await;

        let expected = Notification {
            title: "AI Companion".into(),
            body: "New reply is ready".into(),
        };
        assert_eq!(rx.try_recv().ok(), Some(expected.clone()));
        assert_eq!(rx.try_recv().ok(), Some(expected));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn load_and_reset() {
        let h = harness();
        h.store.add_message(Message::user(1, "old q")).await.unwrap();
        h.store
            .add_message(Message::assistant(1, "old a"))
            .await
            .unwrap();

        assert_eq!(h.controller.load_messages().await.unwrap(), 2);
        assert_eq!(h.controller.messages().len(), 2);
        assert!(!h.controller.can_continue());

        h.controller.reset();
        assert!(h.controller.messages().is_empty());
    }
}
