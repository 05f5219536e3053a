//! Per-invocation output channel.
//!
//! JSON mode writes a single well-formed object to stdout and routes
//! warnings to stderr; text mode writes everything to stdout. Warnings
//! are also collected so commands can embed them in response payloads.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

#[derive(Debug)]
pub struct OutputChannel {
    pub format: OutputFormat,
    warnings: Vec<WarningRecord>,
}

impl OutputChannel {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            warnings: Vec::new(),
        }
    }

    pub fn json_mode(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Deterministic JSON to stdout: sorted keys, trailing newline.
    pub fn emit_json(&self, data: &Value) {
        match serde_json::to_string_pretty(data) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => eprintln!("[WARNING] failed to serialize output: {err}"),
        }
    }

    pub fn emit_text(&self, message: &str) {
        println!("{message}");
    }

    /// Warnings go to stderr in JSON mode (stdout stays a single object)
    /// and to stdout in text mode.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.warnings.push(WarningRecord {
            timestamp: Utc::now().to_rfc3339(),
            level: "warning".to_string(),
            message: message.clone(),
        });
        if self.json_mode() {
            eprintln!("[WARNING] {message}");
        } else {
            println!("[WARNING] {message}");
        }
    }

    pub fn warnings(&self) -> &[WarningRecord] {
        &self.warnings
    }
}

/// Standard success envelope for JSON mode.
pub fn success_envelope(data: Value) -> Value {
    serde_json::json!({
        "success": true,
        "data": data,
        "error": null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_collected_in_order() {
        let mut channel = OutputChannel::new(OutputFormat::Json);
        channel.warn("first");
        channel.warn("second");
        let messages: Vec<&str> = channel
            .warnings()
            .iter()
            .map(|w| w.message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn envelope_shape_is_stable() {
        let envelope = success_envelope(serde_json::json!({"count": 1}));
        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["data"]["count"], 1);
        assert!(envelope["error"].is_null());
    }
}
