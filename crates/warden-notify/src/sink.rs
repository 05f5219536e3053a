//! Notification sinks. Environment variables:
//!
//! - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID` for Telegram
//! - `NTFYT_TOPIC`, `NTFYT_BASE_URL`, `NTFYT_ACCESS_TOKEN` for ntfy,
//!   with `NTFY_*` aliases accepted
//!
//! Transport is intentionally out of scope here; configured sinks render
//! and hand off to stdout, unconfigured ones error, and the dispatcher
//! never lets a sink failure affect the workflow outcome.

use crate::error::NotifyError;
use crate::types::{NotificationMessage, NotificationSinkKind};

pub trait NotificationSink {
    fn kind(&self) -> NotificationSinkKind;
    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Stdout
    }

    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        println!(
            "[{:?}] {} | task={} | {}",
            message.severity,
            message.title,
            message
                .task_id
                .as_ref()
                .map(|t| t.0.as_str())
                .unwrap_or("-"),
            message.body
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TelegramSink {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramSink {
    pub fn from_env() -> Self {
        Self {
            bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}

impl NotificationSink for TelegramSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Telegram
    }

    fn send(&self, _message: &NotificationMessage) -> Result<(), NotifyError> {
        if self.bot_token.is_none() {
            return Err(NotifyError::MissingConfig {
                sink: "telegram".to_string(),
                variable: "TELEGRAM_BOT_TOKEN".to_string(),
            });
        }
        if self.chat_id.is_none() {
            return Err(NotifyError::MissingConfig {
                sink: "telegram".to_string(),
                variable: "TELEGRAM_CHAT_ID".to_string(),
            });
        }
        Err(NotifyError::SinkFailed {
            message: "telegram transport not implemented yet".to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NtfySink {
    pub topic: Option<String>,
    pub base_url: String,
    pub access_token: Option<String>,
}

const DEFAULT_NTFY_BASE_URL: &str = "https://ntfyt.sh";

fn env_with_alias(primary: &str, alias: &str) -> Option<String> {
    std::env::var(primary).ok().or_else(|| std::env::var(alias).ok())
}

impl NtfySink {
    pub fn from_env() -> Self {
        Self {
            topic: env_with_alias("NTFYT_TOPIC", "NTFY_TOPIC"),
            base_url: env_with_alias("NTFYT_BASE_URL", "NTFY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_NTFY_BASE_URL.to_string()),
            access_token: env_with_alias("NTFYT_ACCESS_TOKEN", "NTFY_ACCESS_TOKEN"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.topic.is_some()
    }
}

impl NotificationSink for NtfySink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Ntfy
    }

    fn send(&self, _message: &NotificationMessage) -> Result<(), NotifyError> {
        if self.topic.is_none() {
            return Err(NotifyError::MissingConfig {
                sink: "ntfy".to_string(),
                variable: "NTFYT_TOPIC".to_string(),
            });
        }
        Err(NotifyError::SinkFailed {
            message: "ntfy transport not implemented yet".to_string(),
        })
    }
}

/// Fans a message out to every registered sink. Failures are collected,
/// not raised; notification delivery never affects workflow exit codes.
pub struct NotificationDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::from_env()
    }
}

impl NotificationDispatcher {
    /// Stdout always; Telegram and ntfy only when their environment
    /// variables are present.
    pub fn from_env() -> Self {
        let mut sinks: Vec<Box<dyn NotificationSink>> = vec![Box::new(StdoutSink)];
        let telegram = TelegramSink::from_env();
        if telegram.is_configured() {
            sinks.push(Box::new(telegram));
        }
        let ntfy = NtfySink::from_env();
        if ntfy.is_configured() {
            sinks.push(Box::new(ntfy));
        }
        Self { sinks }
    }

    pub fn with_sinks(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn dispatch(&self, message: &NotificationMessage) -> Vec<NotifyError> {
        self.sinks
            .iter()
            .filter_map(|sink| sink.send(message).err())
            .collect()
    }
}
