//! Hub wire protocol (JSON hub protocol, version 1).
//!
//! Every message is a JSON object terminated by the record separator
//! `0x1E`; one websocket frame may carry several records. Message kinds are
//! numeric tags in the `type` field, so records are decoded through a flat
//! raw struct and then mapped onto [`HubMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Record terminator.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Hub method that tries to acquire the lock. Resolves to a boolean.
pub const TRY_LOCK: &str = "TryLock";
/// Hub method that releases the lock.
pub const UNLOCK: &str = "Unlock";

const TYPE_INVOCATION: u64 = 1;
const TYPE_COMPLETION: u64 = 3;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed hub message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("hub message without a type")]
    MissingType,
    #[error("hub message of type {kind} without {field}")]
    MissingField { kind: u64, field: &'static str },
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
}

/// A decoded hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Server-to-client method call (a push).
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    /// Result of an earlier client invocation.
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Streaming and other kinds this client never asks for.
    Other(u64),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: Option<u64>,
    invocation_id: Option<String>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    result: Option<Value>,
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingInvocation<'a> {
    r#type: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    invocation_id: Option<&'a str>,
    target: &'a str,
    arguments: &'a [Value],
}

#[derive(Debug, Serialize)]
struct OutgoingSignal {
    r#type: u64,
}

#[derive(Debug, Serialize)]
struct HandshakeRequest<'a> {
    protocol: &'a str,
    version: u32,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    error: Option<String>,
}

/// Split a frame into its records, dropping the empty tail after the last
/// separator.
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

fn terminate(json: String) -> String {
    let mut record = json;
    record.push(RECORD_SEPARATOR);
    record
}

/// The handshake record sent right after the socket opens.
///
/// # Errors
///
/// Returns `ProtocolError::Json` if serialization fails.
pub fn handshake_request() -> Result<String, ProtocolError> {
    let request = HandshakeRequest {
        protocol: "json",
        version: 1,
    };
    Ok(terminate(serde_json::to_string(&request)?))
}

/// Check the server's handshake answer: `{}` accepts, `{"error": ...}`
/// rejects.
///
/// # Errors
///
/// Returns `ProtocolError` if the answer is malformed or carries an error.
pub fn parse_handshake_response(record: &str) -> Result<(), ProtocolError> {
    let response: HandshakeResponse = serde_json::from_str(record)?;
    match response.error {
        Some(error) => Err(ProtocolError::HandshakeRejected(error)),
        None => Ok(()),
    }
}

/// Decode one record.
///
/// # Errors
///
/// Returns `ProtocolError` if the record is not a well-formed hub message.
pub fn parse_message(record: &str) -> Result<HubMessage, ProtocolError> {
    let raw: RawMessage = serde_json::from_str(record)?;
    let kind = raw.kind.ok_or(ProtocolError::MissingType)?;

    let message = match kind {
        TYPE_INVOCATION => HubMessage::Invocation {
            invocation_id: raw.invocation_id,
            target: raw.target.ok_or(ProtocolError::MissingField {
                kind,
                field: "target",
            })?,
            arguments: raw.arguments,
        },
        TYPE_COMPLETION => HubMessage::Completion {
            invocation_id: raw.invocation_id.ok_or(ProtocolError::MissingField {
                kind,
                field: "invocationId",
            })?,
            result: raw.result,
            error: raw.error,
        },
        TYPE_PING => HubMessage::Ping,
        TYPE_CLOSE => HubMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect,
        },
        other => HubMessage::Other(other),
    };
    Ok(message)
}

/// Encode a parameterless invocation. With an id the server answers with a
/// completion; without one it is fire-and-forget.
///
/// # Errors
///
/// Returns `ProtocolError::Json` if serialization fails.
pub fn encode_invocation(invocation_id: Option<&str>, target: &str) -> Result<String, ProtocolError> {
    let invocation = OutgoingInvocation {
        r#type: TYPE_INVOCATION,
        invocation_id,
        target,
        arguments: &[],
    };
    Ok(terminate(serde_json::to_string(&invocation)?))
}

/// Encode a keep-alive ping.
///
/// # Errors
///
/// Returns `ProtocolError::Json` if serialization fails.
pub fn encode_ping() -> Result<String, ProtocolError> {
    Ok(terminate(serde_json::to_string(&OutgoingSignal { r#type: TYPE_PING })?))
}

/// Encode a graceful close.
///
/// # Errors
///
/// Returns `ProtocolError::Json` if serialization fails.
pub fn encode_close() -> Result<String, ProtocolError> {
    Ok(terminate(serde_json::to_string(&OutgoingSignal { r#type: TYPE_CLOSE })?))
}

// =============================================================================
// Negotiation
// =============================================================================

/// Body of `POST {hub}/negotiate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub connection_id: Option<String>,
    pub connection_token: Option<String>,
    pub negotiate_version: Option<u32>,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    /// Redirect to another service; not supported.
    pub url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

impl NegotiateResponse {
    /// Whether the server accepts websocket connections. An empty transport
    /// list is taken as "anything goes".
    #[must_use]
    pub fn offers_websockets(&self) -> bool {
        self.available_transports.is_empty()
            || self
                .available_transports
                .iter()
                .any(|t| t.transport == "WebSockets")
    }

    /// The value for the socket's `id` query parameter: the connection
    /// token for version 1, the connection id for version 0.
    #[must_use]
    pub fn connection_token(&self) -> Option<&str> {
        self.connection_token
            .as_deref()
            .or(self.connection_id.as_deref())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_request_is_terminated() {
        let request = handshake_request().unwrap();
        assert_eq!(request, "{\"protocol\":\"json\",\"version\":1}\u{1e}");
    }

    #[test]
    fn test_handshake_response() {
        assert!(parse_handshake_response("{}").is_ok());
        assert!(matches!(
            parse_handshake_response(r#"{"error":"Requested protocol 'json' is not available."}"#),
            Err(ProtocolError::HandshakeRejected(_))
        ));
    }

    #[test]
    fn test_split_records() {
        let frame = "{\"type\":6}\u{1e}{\"type\":1,\"target\":\"MachineBusy\",\"arguments\":[]}\u{1e}";
        let records: Vec<&str> = split_records(frame).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(parse_message(records[0]).unwrap(), HubMessage::Ping);
    }

    #[test]
    fn test_parse_push() {
        let message =
            parse_message(r#"{"type":1,"target":"MachineUnlocked","arguments":[]}"#).unwrap();
        assert_eq!(
            message,
            HubMessage::Invocation {
                invocation_id: None,
                target: "MachineUnlocked".to_string(),
                arguments: vec![],
            }
        );
    }

    #[test]
    fn test_parse_completion() {
        let ok = parse_message(r#"{"type":3,"invocationId":"0","result":true}"#).unwrap();
        assert_eq!(
            ok,
            HubMessage::Completion {
                invocation_id: "0".to_string(),
                result: Some(Value::Bool(true)),
                error: None,
            }
        );

        let failed = parse_message(r#"{"type":3,"invocationId":"1","error":"boom"}"#).unwrap();
        assert!(matches!(
            failed,
            HubMessage::Completion { error: Some(ref e), result: None, .. } if e == "boom"
        ));
    }

    #[test]
    fn test_parse_close() {
        let close = parse_message(r#"{"type":7,"error":"bye","allowReconnect":true}"#).unwrap();
        assert_eq!(
            close,
            HubMessage::Close {
                error: Some("bye".to_string()),
                allow_reconnect: true,
            }
        );
        assert_eq!(
            parse_message(r#"{"type":7}"#).unwrap(),
            HubMessage::Close {
                error: None,
                allow_reconnect: false,
            }
        );
    }

    #[test]
    fn test_parse_rejects_incomplete_messages() {
        assert!(matches!(
            parse_message(r#"{"target":"MachineBusy"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            parse_message(r#"{"type":1,"arguments":[]}"#),
            Err(ProtocolError::MissingField { field: "target", .. })
        ));
        assert!(matches!(
            parse_message(r#"{"type":3,"result":true}"#),
            Err(ProtocolError::MissingField { .. })
        ));
        assert!(parse_message("not json").is_err());
    }

    #[test]
    fn test_unknown_kinds_pass_through() {
        assert_eq!(parse_message(r#"{"type":2,"item":1}"#).unwrap(), HubMessage::Other(2));
    }

    #[test]
    fn test_encode_invocation() {
        let with_id = encode_invocation(Some("3"), TRY_LOCK).unwrap();
        let body: Value = serde_json::from_str(with_id.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"type": 1, "invocationId": "3", "target": "TryLock", "arguments": []})
        );

        let fire_and_forget = encode_invocation(None, UNLOCK).unwrap();
        assert!(!fire_and_forget.contains("invocationId"));
        assert!(fire_and_forget.ends_with(RECORD_SEPARATOR));
    }

    #[test]
    fn test_encode_signals() {
        assert_eq!(encode_ping().unwrap(), "{\"type\":6}\u{1e}");
        assert_eq!(encode_close().unwrap(), "{\"type\":7}\u{1e}");
    }

    #[test]
    fn test_negotiate_response() {
        let body = r#"{
            "negotiateVersion": 1,
            "connectionId": "abc",
            "connectionToken": "tok",
            "availableTransports": [
                {"transport": "WebSockets", "transferFormats": ["Text", "Binary"]},
                {"transport": "LongPolling", "transferFormats": ["Text"]}
            ]
        }"#;
        let response: NegotiateResponse = serde_json::from_str(body).unwrap();
        assert!(response.offers_websockets());
        assert_eq!(response.connection_token(), Some("tok"));

        let v0: NegotiateResponse =
            serde_json::from_str(r#"{"connectionId":"abc","availableTransports":[{"transport":"LongPolling"}]}"#)
                .unwrap();
        assert!(!v0.offers_websockets());
        assert_eq!(v0.connection_token(), Some("abc"));
    }
}
