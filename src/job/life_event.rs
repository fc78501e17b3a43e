use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded transition in a job's life. Never changed once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeEvent {
    timestamp: DateTime<Utc>,
    verb: String,
    from_state: String,
    to_state: String,
}

impl LifeEvent {
    pub fn new(verb: impl Into<String>, from_state: impl Into<String>, to_state: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            verb: verb.into(),
            from_state: from_state.into(),
            to_state: to_state.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn from_state(&self) -> &str {
        &self.from_state
    }

    pub fn to_state(&self) -> &str {
        &self.to_state
    }

    /// Human-readable form: `"<verb> from <from> to <to>"`.
    pub fn statement(&self) -> String {
        format!("{} from {} to {}", self.verb, self.from_state, self.to_state)
    }
}

impl fmt::Display for LifeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.to_rfc3339(), self.statement())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_rendering() {
        let event = LifeEvent::new("set name", "a.csv", "b.csv");
        assert_eq!(event.statement(), "set name from a.csv to b.csv");
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let event = LifeEvent::new("transfer", "inbox", "archive");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["fromState"], "inbox");
        assert_eq!(json["toState"], "archive");
        assert!(json.get("timestamp").is_some());

        let back: LifeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
