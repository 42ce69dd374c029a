//! Context window accounting.
//!
//! Prompt size is estimated from character counts rather than by running
//! the tokenizer. The same estimate decides whether a request fits and how
//! much free text a templated prompt may carry.

use tracing::{debug, warn};

use super::error::InferenceError;
use super::types::{ChatTurn, GenerationOptions};

/// Minimum allowed context window.
pub const MIN_CONTEXT_SIZE_TOKENS: usize = 512;

/// Rough characters-per-token ratio used to estimate prompt size.
pub const CHARS_PER_TOKEN: usize = 4;

/// Per-turn template overhead (role markers, separators).
pub const TOKENS_PER_TURN: usize = 4;

/// Clamp a configured context window to the supported minimum.
pub fn effective_context_size_tokens(requested: usize) -> usize {
    if requested < MIN_CONTEXT_SIZE_TOKENS {
        warn!(
            requested,
            "model.context_size_tokens too small, clamping to {MIN_CONTEXT_SIZE_TOKENS}"
        );
        return MIN_CONTEXT_SIZE_TOKENS;
    }
    requested
}

/// Estimate the prompt size of a request in tokens.
pub fn estimate_prompt_tokens(turns: &[ChatTurn]) -> usize {
    turns
        .iter()
        .map(|t| t.content.chars().count().div_ceil(CHARS_PER_TOKEN) + TOKENS_PER_TURN)
        .sum()
}

/// Reject a request whose prompt plus output budget exceeds the window.
///
/// # Errors
///
/// Returns [`InferenceError::ContextOverflow`] when the request does not fit.
pub fn check_fits(
    turns: &[ChatTurn],
    options: &GenerationOptions,
    context_size_tokens: usize,
) -> Result<(), InferenceError> {
    let prompt = estimate_prompt_tokens(turns);
    if prompt + options.max_tokens > context_size_tokens {
        debug!(
            prompt_tokens = prompt,
            max_tokens = options.max_tokens,
            context = context_size_tokens,
            "request exceeds context window"
        );
        return Err(InferenceError::ContextOverflow(format!(
            "~{prompt} prompt tokens + {} output tokens exceed the {context_size_tokens}-token context",
            options.max_tokens
        )));
    }
    Ok(())
}

/// Characters one more user turn may hold after `fixed` turns while still
/// leaving room for the output budget.
pub fn user_turn_char_room(
    fixed: &[ChatTurn],
    options: &GenerationOptions,
    context_size_tokens: usize,
) -> usize {
    let used = estimate_prompt_tokens(fixed) + TOKENS_PER_TURN + options.max_tokens;
    context_size_tokens.saturating_sub(used) * CHARS_PER_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_tokens: usize) -> GenerationOptions {
        GenerationOptions::default().with_max_tokens(max_tokens)
    }

    #[test]
    fn context_size_is_clamped() {
        assert_eq!(effective_context_size_tokens(0), MIN_CONTEXT_SIZE_TOKENS);
        assert_eq!(effective_context_size_tokens(2048), 2048);
    }

    #[test]
    fn estimate_counts_chars_and_turn_overhead() {
        let turns = vec![ChatTurn::user("abcd"), ChatTurn::assistant("abcde")];
        // 1 + 4 and 2 + 4
        assert_eq!(estimate_prompt_tokens(&turns), 11);
        assert_eq!(estimate_prompt_tokens(&[]), 0);
    }

    #[test]
    fn fits_up_to_the_window_exactly() {
        // 25 + 4 prompt tokens, 71 output tokens
        let turns = vec![ChatTurn::user("x".repeat(100))];
        assert!(check_fits(&turns, &options(71), 100).is_ok());

        let err = check_fits(&turns, &options(72), 100);
        assert!(err.is_err_and(|e| e.is_context_overflow()));
    }

    #[test]
    fn room_fills_the_remaining_window() {
        let system = vec![ChatTurn::system("Be kind.")];
        let opts = options(512);
        let room = user_turn_char_room(&system, &opts, 2048);

        let mut turns = system.clone();
        turns.push(ChatTurn::user("y".repeat(room)));
        assert!(check_fits(&turns, &opts, 2048).is_ok());

        turns.pop();
        turns.push(ChatTurn::user("y".repeat(room + 1)));
        assert!(check_fits(&turns, &opts, 2048).is_err());
    }

    #[test]
    fn no_room_when_output_alone_fills_the_window() {
        assert_eq!(user_turn_char_room(&[], &options(600), 512), 0);
    }
}
