//! Response envelopes, one per stdout line.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    /// Absent only when the request line could not be parsed far enough to read one.
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,
}

impl Envelope<'_> {
    fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn ok(id: &str, result: Value) -> Value {
    Envelope {
        id: Some(id),
        ok: true,
        result: Some(result),
        error: None,
    }
    .into_value()
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    failure(Some(id), code, message.into(), details)
}

/// Reply to a line that is not a request object.
pub fn malformed_request(message: impl Into<String>) -> Value {
    failure(None, "bad_json", message.into(), None)
}

fn failure(id: Option<&str>, code: &str, message: String, details: Option<Value>) -> Value {
    Envelope {
        id,
        ok: false,
        result: None,
        error: Some(ErrorBody {
            code,
            message,
            details,
        }),
    }
    .into_value()
}
