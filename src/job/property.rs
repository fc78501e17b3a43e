use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type recorded for a property value at the moment it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl PropertyType {
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::String(_) => PropertyType::String,
            Value::Number(_) => PropertyType::Number,
            Value::Bool(_) => PropertyType::Boolean,
            Value::Array(_) => PropertyType::Array,
            Value::Object(_) => PropertyType::Object,
            Value::Null => PropertyType::Null,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
            PropertyType::Null => "null",
        };
        f.write_str(s)
    }
}

/// A keyed value in a job's property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProperty {
    key: String,
    value: Value,
    #[serde(rename = "type")]
    inferred_type: PropertyType,
}

impl JobProperty {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            inferred_type: PropertyType::infer(&value),
            value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn inferred_type(&self) -> PropertyType {
        self.inferred_type
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = value.into();
        self.inferred_type = PropertyType::infer(&self.value);
    }
}

/// Renders a value for a lifecycle statement: strings bare, everything else
/// as compact JSON.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
