use serde_json::{Map as JsonMap, Value};

/// Decoded form of one test case's input literal.
#[derive(Debug)]
pub enum TestInput {
    /// A JSON array literal: the argument list, or the single array argument
    /// of a one-parameter entry point.
    Positional(Vec<Value>),
    /// Any other non-object JSON literal, passed as the sole argument.
    Scalar(Value),
    /// A JSON object literal: arguments bound to parameters by field name.
    Named(JsonMap<String, Value>),
}

pub fn parse_input(raw: &str) -> Result<TestInput, String> {
    if raw.trim_start().starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(raw).map_err(|e| format!("Invalid input format: {e}"))?;
        return Ok(TestInput::Positional(values));
    }

    let value: Value = serde_json::from_str(raw).map_err(|e| format!("Invalid input format: {e}"))?;
    match value {
        Value::Object(fields) => Ok(TestInput::Named(fields)),
        other => Ok(TestInput::Scalar(other)),
    }
}
