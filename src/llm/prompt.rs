//! Request shaping and prompt templates.

use crate::message::{Message, Role};

use super::types::ChatTurn;

/// Cue sent as the user turn when extending the previous answer.
pub const CONTINUATION_CUE: &str =
    "Continue your previous answer exactly where it stopped. Do not repeat what you already wrote.";

/// Default question for [`document_prompt`].
pub const DEFAULT_DOCUMENT_QUESTION: &str = "Summarize this document";

/// Convert history to turns, dropping any message whose role matches the
/// previously kept one.
///
/// `[user a, user b, assistant c]` becomes `[user a, assistant c]`.
pub fn collapse_adjacent_roles(history: &[Message]) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = Vec::with_capacity(history.len());
    for msg in history {
        if turns.last().is_some_and(|t| t.role == msg.role) {
            continue;
        }
        turns.push(ChatTurn::from(msg));
    }
    turns
}

/// Assemble a full request: optional system prompt, shaped history, then
/// the new user message.
pub fn build_turns(
    system_prompt: Option<&str>,
    history: &[Message],
    message: &str,
    collapse_roles: bool,
) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        turns.push(ChatTurn::system(prompt));
    }
    if collapse_roles {
        turns.extend(collapse_adjacent_roles(history));
    } else {
        turns.extend(history.iter().map(ChatTurn::from));
    }
    turns.push(ChatTurn::user(message));
    turns
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Prompt asking a question about a document, truncated to `max_chars`.
pub fn document_prompt(content: &str, question: &str, max_chars: usize) -> String {
    format!(
        "Based on the following document content, {question}\n\n\
         Document:\n{}\n\n\
         Please provide a helpful response:",
        truncate_chars(content, max_chars)
    )
}

/// Prompt asking for an analysis of an image from OCR text and a visual
/// description. Empty sections are omitted.
pub fn image_prompt(extracted_text: &str, description: &str) -> String {
    let mut prompt = String::from("Analyze this image.\n\n");
    if !extracted_text.is_empty() {
        prompt.push_str("Extracted text from image:\n");
        prompt.push_str(extracted_text);
        prompt.push_str("\n\n");
    }
    if !description.is_empty() {
        prompt.push_str("Visual description: ");
        prompt.push_str(description);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Provide a detailed analysis of what you see and any text content found.");
    prompt
}

/// Render history as a `role: content` transcript.
pub fn transcript(history: &[Message]) -> String {
    history
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| format!("{}: {}", m.role, m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking for a summary of a conversation. Only the most recent
/// `max_chars` characters of the transcript are kept so the request itself
/// fits the context window.
pub fn summary_prompt(history: &[Message], max_chars: usize) -> String {
    let full = transcript(history);
    format!(
        "Summarize the following conversation so it can be continued later. \
         Keep names, facts, decisions and open questions. Be concise.\n\n\
         Conversation:\n{}\n\n\
         Summary:",
        tail_chars(&full, max_chars)
    )
}
