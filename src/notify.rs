use serde_json::Value;
use std::time::{Duration, Instant};

/// How long a toast stays on screen.
pub const TTL: Duration = Duration::from_millis(3500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    pub created: Instant,
}

impl Notification {
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= TTL
    }
}

/// Flattens whatever shape an error or message arrived in to display text.
pub fn message_from_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => ["message", "error", "fatal", "msg", "title", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct Notifier {
    next_id: u64,
    entries: Vec<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_at(&mut self, severity: Severity, message: impl Into<String>, now: Instant) -> u64 {
        self.next_id += 1;
        self.entries.push(Notification {
            id: self.next_id,
            severity,
            message: message.into(),
            created: now,
        });
        self.next_id
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>) -> u64 {
        self.push_at(severity, message, Instant::now())
    }

    pub fn success(&mut self, message: impl Into<String>) -> u64 {
        self.push(Severity::Success, message)
    }

    pub fn error(&mut self, message: impl Into<String>) -> u64 {
        self.push(Severity::Error, message)
    }

    pub fn info(&mut self, message: impl Into<String>) -> u64 {
        self.push(Severity::Info, message)
    }

    /// Drops expired entries and returns the rest, oldest first.
    pub fn active(&mut self, now: Instant) -> &[Notification] {
        self.entries.retain(|n| !n.expired(now));
        &self.entries
    }

    pub fn dismiss(&mut self, id: u64) {
        self.entries.retain(|n| n.id != id);
    }

    /// Everything pushed and not yet pruned, regardless of age.
    pub fn pending(&self) -> &[Notification] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Notification> {
        self.entries.last()
    }
}
