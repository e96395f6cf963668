//! OCPP-J message framing
//!
//! Encodes and decodes the OCPP-J (JSON over WebSocket) envelope used by
//! the simulated charge points:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! Pure transformation only: no retries, no I/O.

use serde_json::Value;
use thiserror::Error;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Parsing ────────────────────────────────────────────

    /// Parse a raw JSON text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        let arr = match value {
            Value::Array(arr) => arr,
            _ => return Err(FrameError::NotAnArray),
        };

        let msg_type = arr
            .first()
            .ok_or(FrameError::EmptyArray)?
            .as_u64()
            .ok_or(FrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(arr),
            _ => Err(FrameError::UnknownMessageType(msg_type)),
        }
    }

    fn parse_call(arr: Vec<Value>) -> Result<Self, FrameError> {
        expect_arity(&arr, 4, 4)?;
        let mut it = arr.into_iter().skip(1);

        let unique_id = take_string(it.next(), "uniqueId must be a string")?;
        let action = take_string(it.next(), "action must be a string")?;
        let payload = it.next().unwrap_or(Value::Null);
        if !payload.is_object() {
            return Err(FrameError::FieldTypeMismatch("payload must be an object"));
        }

        Ok(Self::Call {
            unique_id,
            action,
            payload,
        })
    }

    fn parse_call_result(arr: Vec<Value>) -> Result<Self, FrameError> {
        expect_arity(&arr, 3, 3)?;
        let mut it = arr.into_iter().skip(1);

        let unique_id = take_string(it.next(), "uniqueId must be a string")?;
        let payload = it.next().unwrap_or_else(empty_object);

        Ok(Self::CallResult { unique_id, payload })
    }

    fn parse_call_error(arr: Vec<Value>) -> Result<Self, FrameError> {
        // errorDetails is required by OCPP-J but commonly omitted.
        expect_arity(&arr, 4, 5)?;
        let mut it = arr.into_iter().skip(1);

        let unique_id = take_string(it.next(), "uniqueId must be a string")?;
        let error_code = take_string(it.next(), "errorCode must be a string")?;
        let error_description = take_string(it.next(), "errorDescription must be a string")?;
        let error_details = it.next().unwrap_or_else(empty_object);

        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to a JSON string.
    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        // Display on a Value cannot fail
        arr.to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Create a `CallError` response for a given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn expect_arity(arr: &[Value], min: usize, max: usize) -> Result<(), FrameError> {
    if arr.len() < min || arr.len() > max {
        return Err(FrameError::WrongArity {
            expected: min,
            got: arr.len(),
        });
    }
    Ok(())
}

fn take_string(value: Option<Value>, msg: &'static str) -> Result<String, FrameError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(FrameError::FieldTypeMismatch(msg)),
    }
}

// ── Call encoding ──────────────────────────────────────────────

/// An encoded outbound Call, ready for the transport.
#[derive(Debug, Clone)]
pub struct EncodedCall {
    pub unique_id: String,
    pub text: String,
}

/// Per-session monotonic generator for Call unique ids.
///
/// Ids look like `<prefix>-<seq>`. The caller passes a predicate reporting
/// ids still awaiting a result so a fresh id never collides with one in flight.
#[derive(Debug)]
pub struct CallIdGenerator {
    prefix: String,
    next: u64,
}

impl CallIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }

    pub fn next_id(&mut self, in_flight: impl Fn(&str) -> bool) -> String {
        loop {
            let id = format!("{}-{}", self.prefix, self.next);
            self.next = self.next.wrapping_add(1);
            if !in_flight(&id) {
                return id;
            }
        }
    }

    /// Allocate a fresh id and serialize `[2, id, action, payload]`.
    pub fn encode_call(
        &mut self,
        action: &str,
        payload: Value,
        in_flight: impl Fn(&str) -> bool,
    ) -> EncodedCall {
        let unique_id = self.next_id(in_flight);
        let text = OcppFrame::Call {
            unique_id: unique_id.clone(),
            action: action.to_string(),
            payload,
        }
        .serialize();
        EncodedCall { unique_id, text }
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("OCPP message is not a JSON array")]
    NotAnArray,
    #[error("Empty OCPP message array")]
    EmptyArray,
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Wrong number of fields: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_call_result() {
        let text = r#"[3,"abc123",{"status":"Accepted","currentTime":"2024-01-01T00:00:00Z","interval":300}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(payload["status"], "Accepted");
            }
            _ => panic!("Expected CallResult frame"),
        }
    }

    #[test]
    fn parse_call_error_without_details() {
        let text = r#"[4,"abc123","NotImplemented","Action not supported"]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_details,
                ..
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(error_code, "NotImplemented");
                assert!(error_details.is_object());
            }
            _ => panic!("Expected CallError frame"),
        }
    }

    #[test]
    fn parse_inbound_call() {
        let text = r#"[2,"cs-1","RemoteStartTransaction",{"idTag":"ABC"}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        assert_eq!(
            frame,
            OcppFrame::Call {
                unique_id: "cs-1".into(),
                action: "RemoteStartTransaction".into(),
                payload: serde_json::json!({"idTag": "ABC"}),
            }
        );
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            OcppFrame::parse("not json"),
            Err(FrameError::InvalidJson(_))
        ));
    }

    #[test]
    fn rejects_unknown_message_type() {
        assert_eq!(
            OcppFrame::parse(r#"[5,"id",{}]"#),
            Err(FrameError::UnknownMessageType(5))
        );
    }

    #[test]
    fn rejects_non_numeric_message_type() {
        assert_eq!(
            OcppFrame::parse(r#"["3","id",{}]"#),
            Err(FrameError::InvalidMessageType)
        );
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(matches!(
            OcppFrame::parse(r#"[3,"id"]"#),
            Err(FrameError::WrongArity { .. })
        ));
        assert!(matches!(
            OcppFrame::parse(r#"[2,"id","Heartbeat",{},{}]"#),
            Err(FrameError::WrongArity { .. })
        ));
    }

    #[test]
    fn rejects_objects_and_empty_arrays() {
        assert_eq!(OcppFrame::parse(r#"{"a":1}"#), Err(FrameError::NotAnArray));
        assert_eq!(OcppFrame::parse("[]"), Err(FrameError::EmptyArray));
    }

    #[test]
    fn encode_call_produces_four_element_envelope() {
        let mut ids = CallIdGenerator::new("CP1");
        let call = ids.encode_call("Heartbeat", serde_json::json!({}), |_| false);

        let value: Value = serde_json::from_str(&call.text).unwrap();
        assert_eq!(value[0], 2);
        assert_eq!(value[1], call.unique_id.as_str());
        assert_eq!(value[2], "Heartbeat");
        assert!(value[3].is_object());
        assert_eq!(value.as_array().unwrap().len(), 4);
    }

    #[test]
    fn generator_skips_ids_in_flight() {
        let mut ids = CallIdGenerator::new("CP1");
        let taken = ["CP1-1".to_string(), "CP1-2".to_string()];
        let id = ids.next_id(|candidate| taken.iter().any(|t| t == candidate));
        assert_eq!(id, "CP1-3");
        assert_eq!(ids.next_id(|_| false), "CP1-4");
    }

    #[test]
    fn error_response_serializes_with_details() {
        let text = OcppFrame::error_response("id3", "NotImplemented", "nope").serialize();
        assert_eq!(text, r#"[4,"id3","NotImplemented","nope",{}]"#);
    }
}
