//! UI string lookup for the supported languages.
//!
//! Unknown languages fall back to English; unknown keys fall back to the
//! key itself so a missing entry is visible rather than blank.

/// Languages with a translation table.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "ru"];

const EN: &[(&str, &str)] = &[
    ("app_title", "AI Companion"),
    ("thinking", "Thinking..."),
    ("nothing_to_continue", "Nothing to continue"),
    ("notification_title", "AI Companion"),
    ("notification_body", "New reply is ready"),
    ("summary_banner", "📝 Summary of the previous conversation:"),
    ("conversation_continues", "--- The conversation continues ---"),
    ("context_limit_error", "Error: the conversation is too long for the model's context."),
    ("status_idle", "Idle..."),
    ("status_loading", "Loading model..."),
    ("status_ready", "Model ready"),
    ("status_generating", "Generating response..."),
    ("status_error", "Load error"),
    ("history_cleared", "History cleared"),
    ("settings_saved", "Settings saved"),
    ("exported_to", "Exported to"),
];

const RU: &[(&str, &str)] = &[
    ("app_title", "AI Компаньон"),
    ("thinking", "Думаю..."),
    ("nothing_to_continue", "Нечего продолжать"),
    ("notification_title", "AI Компаньон"),
    ("notification_body", "Новый ответ готов"),
    ("summary_banner", "📝 Краткое содержание предыдущего разговора:"),
    ("conversation_continues", "--- Разговор продолжается ---"),
    ("context_limit_error", "Ошибка: разговор слишком длинный для контекста модели."),
    ("status_idle", "Ожидание..."),
    ("status_loading", "Загрузка модели..."),
    ("status_ready", "Модель готова"),
    ("status_generating", "Генерация ответа..."),
    ("status_error", "Ошибка загрузки"),
    ("history_cleared", "История очищена"),
    ("settings_saved", "Настройки сохранены"),
    ("exported_to", "Экспортировано в"),
];

fn table(lang: &str) -> &'static [(&'static str, &'static str)] {
    match lang {
        "ru" => RU,
        _ => EN,
    }
}

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Translate `key` into `lang`.
///
/// Returns `key` itself when no table has it. Because the return borrows
/// from `key` in that case, the lifetime is tied to both inputs.
pub fn translate<'a>(lang: &str, key: &'a str) -> &'a str {
    lookup(table(lang), key)
        .or_else(|| lookup(EN, key))
        .unwrap_or(key)
}

/// Normalize a locale string (`ru_RU.UTF-8`, `en-US`) to a two-letter code.
pub fn normalize_language(locale: &str) -> Option<String> {
    let code: String = locale
        .split(['_', '-', '.', '@'])
        .next()?
        .to_ascii_lowercase();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code)
    } else {
        None
    }
}

/// Best-effort system UI language from the POSIX locale variables.
///
/// Returns `"en"` when nothing usable is set.
pub fn system_language() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .filter(|v| !v.is_empty() && v != "C" && v != "POSIX")
        .find_map(|v| normalize_language(&v))
        .unwrap_or_else(|| "en".to_owned())
}
