//! Inference backend trait.
//!
//! [`InferenceBackend`] is the seam between request shaping (the adapter)
//! and the runtime that actually runs the model. The production
//! implementation is [`MistralrsBackend`](super::local::MistralrsBackend);
//! tests use [`ScriptedBackend`](super::scripted::ScriptedBackend).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::error::InferenceError;
use super::types::{ChatTurn, GenerationOptions};

/// A stream of generated text fragments.
///
/// Each item is either the next delta or the error that ended the stream.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, InferenceError>> + Send>>;

/// An embedded language-model runtime.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Returns the backend name (e.g. `"mistralrs"`).
    fn name(&self) -> &str;

    /// Run the model to completion and return the first choice's text.
    async fn complete(
        &self,
        turns: &[ChatTurn],
        options: &GenerationOptions,
    ) -> Result<String, InferenceError>;

    /// Start a streaming generation.
    ///
    /// The default implementation runs [`complete`](Self::complete) and
    /// yields the whole reply as one fragment.
    async fn stream(
        &self,
        turns: &[ChatTurn],
        options: &GenerationOptions,
    ) -> Result<TextStream, InferenceError> {
        let text = self.complete(turns, options).await?;
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(text)])))
    }
}
