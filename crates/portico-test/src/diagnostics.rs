//! Diagnostic listener that records events.

use std::sync::Arc;

use parking_lot::Mutex;
use portico_hosting::DiagnosticListener;
use serde_json::Value;

/// Records every hosting diagnostic event.
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnostics {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingDiagnostics {
    /// Creates an empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded event names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Returns the payloads recorded for `name`.
    #[must_use]
    pub fn payloads(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DiagnosticListener for RecordingDiagnostics {
    fn is_enabled(&self, _name: &str) -> bool {
        true
    }

    fn write(&self, name: &str, payload: &Value) {
        self.events.lock().push((name.to_string(), payload.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_recording() {
        let diagnostics = RecordingDiagnostics::new();
        let listener = diagnostics.clone();
        listener.write("a", &json!({"n": 1}));
        listener.write("b", &Value::Null);
        listener.write("a", &json!({"n": 2}));

        assert_eq!(diagnostics.names(), vec!["a", "b", "a"]);
        assert_eq!(diagnostics.payloads("a"), vec![json!({"n": 1}), json!({"n": 2})]);

        diagnostics.clear();
        assert!(diagnostics.names().is_empty());
    }
}
