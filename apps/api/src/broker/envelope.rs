//! Envelope codec for the broker wire format.
//!
//! Job envelope (outbound):   `{ "id": "...", "type": "GET_SIMILARITY_SCORE", "data": {...} }`
//! Response envelope (inbound): `{ "id": "...", "type": "SIMILARITY_SCORE", "payload": {...} }`

use serde::Serialize;
use serde_json::Value;

use crate::broker::family::{JobType, ResponseKind};
use crate::broker::BrokerError;

#[derive(Debug, Serialize)]
struct JobEnvelope<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    job_type: JobType,
    data: &'a Value,
}

/// A decoded response envelope. `payload` is handed back to the caller untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub id: String,
    pub kind: ResponseKind,
    pub payload: Value,
}

/// Decoding failure. Keeps the correlation id when one could be read, so the
/// waiting caller can be rejected instead of left to time out.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub id: Option<String>,
    pub reason: String,
}

impl DecodeError {
    fn without_id(reason: impl Into<String>) -> Self {
        Self {
            id: None,
            reason: reason.into(),
        }
    }

    fn with_id(id: String, reason: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            reason: reason.into(),
        }
    }
}

impl From<DecodeError> for BrokerError {
    fn from(err: DecodeError) -> Self {
        BrokerError::MalformedEnvelope(err.reason)
    }
}

pub fn encode(job_type: JobType, data: &Value, id: &str) -> Result<String, BrokerError> {
    serde_json::to_string(&JobEnvelope { id, job_type, data })
        .map_err(|e| BrokerError::MalformedEnvelope(format!("failed to encode job {id}: {e}")))
}

pub fn decode(wire: &str) -> Result<ResponseEnvelope, DecodeError> {
    let value: Value = serde_json::from_str(wire)
        .map_err(|e| DecodeError::without_id(format!("invalid JSON: {e}")))?;

    let Value::Object(mut fields) = value else {
        return Err(DecodeError::without_id("envelope is not a JSON object"));
    };

    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::String(_)) => return Err(DecodeError::without_id("empty id")),
        Some(other) => {
            return Err(DecodeError::without_id(format!(
                "id must be a string, got {other}"
            )))
        }
        None => return Err(DecodeError::without_id("missing id")),
    };

    let tag = match fields.remove("type") {
        Some(Value::String(tag)) => tag,
        Some(_) => return Err(DecodeError::with_id(id, "type must be a string")),
        None => return Err(DecodeError::with_id(id, "missing type")),
    };

    let kind = match serde_json::from_value::<ResponseKind>(Value::String(tag.clone())) {
        Ok(kind) => kind,
        Err(_) => {
            return Err(DecodeError::with_id(
                id,
                format!("unrecognized response type {tag:?}"),
            ))
        }
    };

    // An explicit `null` is a payload; only an absent field is malformed.
    let Some(payload) = fields.remove("payload") else {
        return Err(DecodeError::with_id(
            id,
            format!("response {tag} has no payload"),
        ));
    };

    Ok(ResponseEnvelope { id, kind, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_writes_id_type_and_data() {
        let data = json!({ "job_description": "Rust engineer", "resume": "..." });
        let wire = encode(JobType::GetSimilarityScore, &data, "abc-123").unwrap();

        let parsed: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed["id"], "abc-123");
        assert_eq!(parsed["type"], "GET_SIMILARITY_SCORE");
        assert_eq!(parsed["data"], data);
    }

    #[test]
    fn test_decode_valid_response() {
        let wire = r#"{"id":"abc","type":"SIMILARITY_SCORE","payload":{"score":{"semantic_similarity":0.62}}}"#;
        let envelope = decode(wire).unwrap();

        assert_eq!(envelope.id, "abc");
        assert_eq!(envelope.kind, ResponseKind::SimilarityScore);
        assert_eq!(envelope.payload["score"]["semantic_similarity"], 0.62);
    }

    #[test]
    fn test_decode_ignores_unknown_extra_fields() {
        let wire = r#"{"id":"abc","type":"CHECKPOINTS","payload":[],"worker":"w-7"}"#;
        let envelope = decode(wire).unwrap();
        assert_eq!(envelope.kind, ResponseKind::Checkpoints);
        assert_eq!(envelope.payload, json!([]));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = decode("not json at all").unwrap_err();
        assert!(err.id.is_none());
        assert!(err.reason.contains("invalid JSON"));
    }

    #[test]
    fn test_decode_rejects_missing_id() {
        let err = decode(r#"{"type":"SIMILARITY_SCORE","payload":{}}"#).unwrap_err();
        assert!(err.id.is_none());
        assert_eq!(err.reason, "missing id");
    }

    #[test]
    fn test_decode_missing_type_keeps_id() {
        let err = decode(r#"{"id":"abc","payload":{}}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("abc"));
        assert_eq!(err.reason, "missing type");
    }

    #[test]
    fn test_decode_unknown_type_keeps_id() {
        let err = decode(r#"{"id":"abc","type":"MYSTERY","payload":{}}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("abc"));
        assert!(err.reason.contains("MYSTERY"));
    }

    #[test]
    fn test_decode_missing_payload_keeps_id() {
        let err = decode(r#"{"id":"abc","type":"COLD_APPROACH"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_decode_null_payload_is_accepted() {
        let envelope = decode(r#"{"id":"abc","type":"COLD_APPROACH","payload":null}"#).unwrap();
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let err = decode("[1, 2, 3]").unwrap_err();
        assert!(err.id.is_none());
    }

    #[test]
    fn test_decode_rejects_numeric_id() {
        let err = decode(r#"{"id":42,"type":"COLD_APPROACH","payload":{}}"#).unwrap_err();
        assert!(err.id.is_none());
        assert!(err.reason.contains("must be a string"));
    }

    #[test]
    fn test_decode_error_maps_to_malformed_envelope() {
        let err: BrokerError = decode("{").unwrap_err().into();
        assert!(matches!(err, BrokerError::MalformedEnvelope(_)));
    }
}
