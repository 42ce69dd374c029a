//! Shared application state.
//!
//! One [`AppState`] is created at startup and handed to every component as
//! `Arc<AppState>`. Mutation only happens through its setters; status
//! changes are published on a watch channel for front-ends to render.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::i18n;
use crate::store::{AUTO_LANGUAGE, MessageStore, Settings, StoreError, Theme};

/// Model and generation status shown in the status bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// The model is loading.
    Loading,
    /// The model is loaded and waiting for input.
    Ready,
    /// A reply is being generated.
    Generating,
    /// The model failed to load.
    Error,
}

impl Status {
    fn label_key(self) -> &'static str {
        match self {
            Self::Idle => "status_idle",
            Self::Loading => "status_loading",
            Self::Ready => "status_ready",
            Self::Generating => "status_generating",
            Self::Error => "status_error",
        }
    }
}

/// Localized status-bar text for `status`.
pub fn status_label(status: Status, lang: &str) -> &'static str {
    i18n::translate(lang, status.label_key())
}

/// Process-wide state: status, UI language and theme.
#[derive(Debug)]
pub struct AppState {
    status: watch::Sender<Status>,
    language: RwLock<String>,
    theme: RwLock<Theme>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// English, system theme, idle.
    pub fn new() -> Self {
        let (status, _) = watch::channel(Status::Idle);
        Self {
            status,
            language: RwLock::new("en".to_owned()),
            theme: RwLock::new(Theme::System),
        }
    }

    /// Convenience constructor returning the shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Current status.
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Publish a new status.
    pub fn set_status(&self, status: Status) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(?previous, ?status, "status changed");
        }
    }

    /// Receive every subsequent status change.
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Effective two-letter UI language.
    pub fn language(&self) -> String {
        self.language
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the UI language. `"auto"` resolves to the system language.
    pub fn set_language(&self, lang: &str) {
        let resolved = if lang.trim().is_empty() || lang.eq_ignore_ascii_case(AUTO_LANGUAGE) {
            i18n::system_language()
        } else {
            i18n::normalize_language(lang).unwrap_or_else(|| "en".to_owned())
        };
        *self
            .language
            .write()
            .unwrap_or_else(PoisonError::into_inner) = resolved;
    }

    /// Current theme.
    pub fn theme(&self) -> Theme {
        *self.theme.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the theme.
    pub fn set_theme(&self, theme: Theme) {
        *self.theme.write().unwrap_or_else(PoisonError::into_inner) = theme;
    }

    /// Translate `key` into the current language.
    pub fn translate(&self, key: &str) -> String {
        i18n::translate(&self.language(), key).to_owned()
    }

    /// Status-bar text for the current status and language.
    pub fn status_label(&self) -> &'static str {
        status_label(self.status(), &self.language())
    }

    /// Read saved settings and apply language and theme.
    ///
    /// Completes only after both have been applied, so callers can render
    /// with the right locale immediately afterwards.
    ///
    /// # Errors
    ///
    /// Returns the store error if settings cannot be read; state is left
    /// unchanged in that case.
    pub async fn load_settings(&self, store: &dyn MessageStore) -> Result<Settings, StoreError> {
        let settings = store.get_settings().await?;
        self.set_language(&settings.language);
        self.set_theme(settings.theme);
        info!(
            language = %self.language(),
            theme = %settings.theme,
            "settings applied"
        );
        Ok(settings)
    }
}
