//! Local notification sinks.
//!
//! The chat controller asks a [`Notifier`] to announce every completed
//! assistant turn. Front-ends pick the sink that matches their platform.

use tokio::sync::mpsc;
use tracing::info;

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Short headline.
    pub title: String,
    /// Body text.
    pub body: String,
}

/// Something that can show a local notification.
pub trait Notifier: Send + Sync {
    /// Show a notification. Delivery is best-effort and never fails the caller.
    fn show_local_notification(&self, title: &str, body: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_local_notification(&self, title: &str, body: &str) {
        info!(%title, %body, "notification");
    }
}

/// Discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn show_local_notification(&self, _title: &str, _body: &str) {}
}

/// Forwards notifications to a channel for a front-end to render.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its notifications arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn show_local_notification(&self, title: &str, body: &str) {
        // A closed receiver means nobody is displaying notifications any more.
        let _ = self.tx.send(Notification {
            title: title.to_owned(),
            body: body.to_owned(),
        });
    }
}
