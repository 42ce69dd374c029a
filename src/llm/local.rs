//! In-process GGUF inference via mistral.rs.
//!
//! [`MistralrsBackend`] loads a packaged weights file once and serves both
//! single-shot and streaming chat requests from it. Streaming events are
//! forwarded through a tokio channel as tokens arrive.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mistralrs::{
    GgufModelBuilder, MemoryGpuConfig, Model, PagedAttentionMetaBuilder, RequestBuilder,
    Response, TextMessageRole, TextMessages,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use super::backend::{InferenceBackend, TextStream};
use super::context::{check_fits, effective_context_size_tokens};
use super::error::InferenceError;
use super::think::{ThinkFilter, strip_think_blocks};
use super::types::{ChatTurn, GenerationOptions};
use crate::config::ModelConfig;
use crate::message::Role;

/// Local mistral.rs backend.
pub struct MistralrsBackend {
    model: Arc<Model>,
    model_id: String,
    context_size_tokens: usize,
}

impl std::fmt::Debug for MistralrsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralrsBackend")
            .field("model_id", &self.model_id)
            .field("context_size_tokens", &self.context_size_tokens)
            .finish()
    }
}

impl MistralrsBackend {
    /// Load the GGUF file named by `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::LoadFailed`] if the file is missing or the
    /// runtime cannot build the model.
    pub async fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let path = config.path.as_path();
        if !path.is_file() {
            return Err(InferenceError::LoadFailed(format!(
                "model file not found: {}",
                path.display()
            )));
        }
        let (dir, file) = split_model_path(path)?;
        let context_size = effective_context_size_tokens(config.context_size_tokens);

        info!(model = %file, context_size, "loading local LLM");

        let model = GgufModelBuilder::new(dir, vec![file.clone()])
            .with_logging()
            .with_paged_attn(|| {
                PagedAttentionMetaBuilder::default()
                    .with_gpu_memory(MemoryGpuConfig::ContextSize(context_size))
                    .build()
            })
            .map_err(|e| InferenceError::LoadFailed(format!("paged attention config failed: {e}")))?
            .build()
            .await
            .map_err(|e| InferenceError::LoadFailed(format!("model build failed: {e}")))?;

        info!("local LLM loaded");
        Ok(Self {
            model: Arc::new(model),
            model_id: file,
            context_size_tokens: context_size,
        })
    }

    /// The context window the model was loaded with.
    pub fn context_size_tokens(&self) -> usize {
        self.context_size_tokens
    }
}

#[async_trait]
impl InferenceBackend for MistralrsBackend {
    fn name(&self) -> &str {
        "mistralrs"
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        options: &GenerationOptions,
    ) -> Result<String, InferenceError> {
        check_fits(turns, options, self.context_size_tokens)?;
        let request = build_request(turns, options);

        let response = self
            .model
            .send_chat_request(request)
            .await
            .map_err(|e| classify_runtime_error(e.to_string()))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| InferenceError::GenerationFailed("no completion returned".into()))?;
        debug!(finish_reason = %choice.finish_reason, "completion finished");

        let raw = choice.message.content.as_deref().unwrap_or_default();
        Ok(strip_think_blocks(raw))
    }

    async fn stream(
        &self,
        turns: &[ChatTurn],
        options: &GenerationOptions,
    ) -> Result<TextStream, InferenceError> {
        check_fits(turns, options, self.context_size_tokens)?;
        let request = build_request(turns, options);
        let model = Arc::clone(&self.model);
        let (tx, rx) = mpsc::channel::<Result<String, InferenceError>>(64);

        // The model Arc and the stream borrowing it live inside the task.
        tokio::spawn(async move {
            let mut stream = match model.stream_chat_request(request).await {
                Ok(s) => s,
                Err(e) => {
                    let _ = tx.send(Err(classify_runtime_error(e.to_string()))).await;
                    return;
                }
            };

            let mut think = ThinkFilter::default();
            let mut fragments: usize = 0;
            while let Some(response) = stream.next().await {
                match response {
                    Response::Chunk(chunk) => {
                        let Some(choice) = chunk.choices.first() else {
                            continue;
                        };
                        let Some(ref content) = choice.delta.content else {
                            continue;
                        };
                        let visible = think.push(content);
                        if !visible.is_empty() {
                            fragments += 1;
                            if tx.send(Ok(visible)).await.is_err() {
                                debug!("stream consumer dropped, stopping");
                                return;
                            }
                        }
                    }
                    Response::Done(done) => {
                        if let Some(content) = done
                            .choices
                            .first()
                            .and_then(|c| c.message.content.as_ref())
                        {
                            let visible = think.push(content);
                            if !visible.is_empty() {
                                fragments += 1;
                                let _ = tx.send(Ok(visible)).await;
                            }
                        }
                        break;
                    }
                    Response::ModelError(msg, _) => {
                        let _ = tx.send(Err(classify_runtime_error(msg))).await;
                        return;
                    }
                    Response::InternalError(e) => {
                        let _ = tx.send(Err(classify_runtime_error(e.to_string()))).await;
                        return;
                    }
                    Response::ValidationError(e) => {
                        let _ = tx.send(Err(classify_runtime_error(e.to_string()))).await;
                        return;
                    }
                    _ => continue,
                }
            }
            let tail = think.finish();
            if !tail.is_empty() {
                fragments += 1;
                let _ = tx.send(Ok(tail)).await;
            }
            debug!(fragments, "mistralrs stream complete");
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn build_request(turns: &[ChatTurn], options: &GenerationOptions) -> RequestBuilder {
    let mut messages = TextMessages::new().enable_thinking(false);
    for turn in turns {
        let role = match turn.role {
            Role::System => TextMessageRole::System,
            Role::User => TextMessageRole::User,
            Role::Assistant => TextMessageRole::Assistant,
        };
        messages = messages.add_message(role, &turn.content);
    }

    RequestBuilder::from(messages)
        .set_sampler_temperature(options.temperature)
        .set_sampler_topp(options.top_p)
        .set_sampler_max_len(options.max_tokens)
        .enable_thinking(false)
}

/// Split a model file path into the directory mistral.rs treats as the model
/// id and the GGUF file name inside it.
fn split_model_path(path: &Path) -> Result<(String, String), InferenceError> {
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            InferenceError::LoadFailed(format!("invalid model path: {}", path.display()))
        })?
        .to_owned();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
        _ => ".".to_owned(),
    };
    Ok((dir, file))
}

/// Map a runtime error message to an [`InferenceError`], recognising the
/// ways llama-style runtimes report an oversized prompt.
pub(crate) fn classify_runtime_error(message: String) -> InferenceError {
    let lower = message.to_lowercase();
    let overflow = lower.contains("max_seq_len")
        || lower.contains("prompt too long")
        || lower.contains("context window")
        || (lower.contains("context") && (lower.contains("exceed") || lower.contains("length")));
    if overflow {
        InferenceError::ContextOverflow(message)
    } else {
        InferenceError::GenerationFailed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognises_overflow_messages() {
        assert!(classify_runtime_error("Prompt too long for model".into()).is_context_overflow());
        assert!(
            classify_runtime_error("sequence exceeds max_seq_len 2048".into())
                .is_context_overflow()
        );
        assert!(
            classify_runtime_error("Requested tokens exceed context length".into())
                .is_context_overflow()
        );
    }

    #[test]
    fn classify_keeps_other_failures_generic() {
        let err = classify_runtime_error("CUDA out of memory".into());
        assert!(matches!(err, InferenceError::GenerationFailed(_)));
    }

    #[test]
    fn split_model_path_separates_dir_and_file() {
        let (dir, file) = split_model_path(Path::new("/opt/models/gemma.gguf"))
            .unwrap_or_else(|_| unreachable!("valid path"));
        assert_eq!(dir, "/opt/models");
        assert_eq!(file, "gemma.gguf");

        let (dir, file) = split_model_path(Path::new("gemma.gguf"))
            .unwrap_or_else(|_| unreachable!("valid path"));
        assert_eq!(dir, ".");
        assert_eq!(file, "gemma.gguf");
    }

    #[tokio::test]
    async fn load_missing_file_fails_without_touching_runtime() {
        let config = ModelConfig {
            path: std::path::PathBuf::from("/nonexistent/companion/model.gguf"),
            ..ModelConfig::default()
        };
        let result = MistralrsBackend::load(&config).await;
        assert!(matches!(result, Err(InferenceError::LoadFailed(_))));
    }
}
