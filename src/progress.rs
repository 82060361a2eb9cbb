//! Operator-visible progress reporting.
//!
//! The engine never talks to a terminal or log file directly; it is handed a
//! [`ProgressSink`] capability and fires messages at it. Sinks must never
//! fail.

use std::sync::Mutex;

/// Append-only progress stream. `log` is fire-and-forget; implementations
/// add their own timestamps.
pub trait ProgressSink {
    fn log(&self, message: &str);
}

/// Forwards progress messages to the `tracing` pipeline.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::info!("{message}");
    }
}

/// Collects messages in memory. Used by tests and embedders that render the
/// stream themselves.
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl ProgressSink for MemorySink {
    fn log(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.log("first");
        sink.log("second");
        assert_eq!(sink.messages(), vec!["first", "second"]);
    }
}
