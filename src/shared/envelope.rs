/**
 * Wire Envelope Structures
 *
 * This module defines the envelope types exchanged over the message broker
 * between the socket service and the listener service, and the response
 * shapes sent back to browser clients.
 *
 * # Message Flow
 *
 * 1. A browser sends `{route, receipt?, data}` over its WebSocket.
 * 2. The socket service wraps it as `{head: {connection_id, session_key?},
 *    body: ...}` and publishes it to the listener queue.
 * 3. The listener replies with `{head: {connection_id?, broadcast,
 *    avoid_self, is_control, req_level}, body: ...}` on the socket queue.
 * 4. The socket service delivers `body` to every eligible endpoint, or
 *    consumes it internally when `is_control` is set.
 *
 * # Receipts
 *
 * A receipt is a caller-supplied correlation id (string or integer) echoed
 * back verbatim on both success and error responses so an asynchronous
 * client can match a response to its request.
 */
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Maximum accepted length of a route string
pub const MAX_ROUTE_LEN: usize = 32;

/// Error code: malformed envelope
pub const ERR_BAD_REQUEST: u16 = 400;
/// Error code: authentication failure
pub const ERR_UNAUTHORIZED: u16 = 401;
/// Error code: authorization failure
pub const ERR_FORBIDDEN: u16 = 403;
/// Error code: referenced entity (or sub-route) not found
pub const ERR_NOT_FOUND: u16 = 404;
/// Error code: field validation failure
pub const ERR_VALIDATION: u16 = 450;
/// Error code: unhandled server fault
pub const ERR_SERVER: u16 = 500;

/// Caller-supplied correlation id, echoed back on responses
///
/// Clients may send either a string or an integer; whichever arrives is
/// returned untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Receipt {
    /// String correlation id
    Text(String),
    /// Integer correlation id
    Number(i64),
}

/// Broker head attached by the socket service to client requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundHead {
    /// Identifier of the originating WebSocket connection
    pub connection_id: String,
    /// Session key cached by the socket service for this connection
    ///
    /// Updated only by control envelopes; `None` for unauthenticated
    /// connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

/// Broker head attached by the listener to outgoing messages
///
/// Delivery flags are fixed at enqueue time and never re-derived when the
/// buffered message is finally flushed to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryHead {
    /// Target endpoint; `None` is only meaningful together with `broadcast`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Deliver to all connected endpoints instead of a single target
    #[serde(default)]
    pub broadcast: bool,
    /// When broadcasting, skip the originating endpoint
    #[serde(default)]
    pub avoid_self: bool,
    /// Control envelope: the body carries session state for the socket
    /// service itself, not an end-user payload
    #[serde(default)]
    pub is_control: bool,
    /// Minimum authorization level an endpoint needs to receive this
    #[serde(default)]
    pub req_level: i32,
}

/// One message on the broker: head plus opaque body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEnvelope {
    /// Delivery instructions for the socket service
    pub head: DeliveryHead,
    /// Response or notification payload
    pub body: Value,
}

/// One client request on the broker: socket head plus client body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// Connection identity attached by the socket service
    pub head: InboundHead,
    /// The client's `{route, receipt?, data}` request, unparsed
    pub body: Value,
}

/// Session state carried by control envelopes
///
/// The socket service updates its per-connection cache from these; they are
/// emitted by the auth handler on login, authenticate and logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// New session key for the connection, or `None` to clear it
    #[serde(default)]
    pub session_key: Option<String>,
    /// Authorization level now associated with the connection
    pub level: i32,
}

/// A single field-tagged validation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The offending field, when the error is tied to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Human-readable error message
    pub message: String,
}

impl FieldError {
    /// Create an error tied to a specific field
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Create an error not tied to any field
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

/// The `data` payload of an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (400, 401, 403, 404, 450 or 500)
    pub error_code: u16,
    /// All collected error messages, not just the first
    pub error_messages: Vec<FieldError>,
}

impl ErrorBody {
    /// Build an error body with a single general message
    pub fn single(error_code: u16, message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_messages: vec![FieldError::general(message)],
        }
    }
}

/// A validated client request
///
/// Only produced by [`RequestEnvelope::parse`]; the route is guaranteed to
/// be a non-empty string within the length bound and `data` is guaranteed
/// to be an object.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// Dot-delimited route, e.g. `forum.insert_post`
    pub route: String,
    /// Optional correlation id
    pub receipt: Option<Receipt>,
    /// Request payload fields
    pub data: Value,
}

/// Why an envelope failed shape validation
///
/// The receipt is salvaged whenever it could still be extracted so the
/// router can answer with a correlated 400; when it is `None` the request
/// is dropped silently.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedEnvelope {
    /// Correlation id, if one could be read from the body
    pub receipt: Option<Receipt>,
    /// Route string, if one could be read from the body
    pub route: Option<String>,
    /// What was wrong
    pub reason: &'static str,
}

impl RequestEnvelope {
    /// Validate the shape of a client request body
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEnvelope`] when the body is not an object, the
    /// route is missing, empty, non-string or over [`MAX_ROUTE_LEN`]
    /// characters, `data` is missing or not an object, or the receipt is
    /// present but neither string nor integer.
    pub fn parse(body: &Value) -> Result<Self, MalformedEnvelope> {
        let map = match body.as_object() {
            Some(map) => map,
            None => {
                return Err(MalformedEnvelope {
                    receipt: None,
                    route: None,
                    reason: "request body is not an object",
                })
            }
        };

        // Salvage the receipt first so shape errors can still be correlated
        let receipt = match map.get("receipt") {
            None | Some(Value::Null) => None,
            Some(value) => match serde_json::from_value::<Receipt>(value.clone()) {
                Ok(receipt) => Some(receipt),
                Err(_) => {
                    return Err(MalformedEnvelope {
                        receipt: None,
                        route: route_of(map),
                        reason: "receipt must be a string or an integer",
                    })
                }
            },
        };

        let malformed = |reason| MalformedEnvelope {
            receipt: receipt.clone(),
            route: route_of(map),
            reason,
        };

        let route = match map.get("route").and_then(Value::as_str) {
            Some(route) if !route.is_empty() => route.to_string(),
            Some(_) => return Err(malformed("route must not be empty")),
            None => return Err(malformed("route is required and must be a string")),
        };
        if route.len() > MAX_ROUTE_LEN {
            return Err(malformed("route is too long"));
        }

        let data = match map.get("data") {
            Some(data @ Value::Object(_)) => data.clone(),
            Some(_) => return Err(malformed("data must be an object")),
            None => return Err(malformed("data is required")),
        };

        Ok(Self {
            route,
            receipt,
            data,
        })
    }
}

fn route_of(map: &serde_json::Map<String, Value>) -> Option<String> {
    map.get("route")
        .and_then(Value::as_str)
        .map(|route| route.to_string())
}

/// Assemble a user-visible response body
///
/// Every end-user response carries the originating route, the receipt when
/// one was supplied, an error flag and the payload.
pub fn response_body(route: &str, receipt: Option<&Receipt>, error: bool, data: Value) -> Value {
    let mut body = json!({
        "route": route,
        "error": error,
        "data": data,
    });
    if let Some(receipt) = receipt {
        body["receipt"] = json!(receipt);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_valid_envelope() {
        let body = json!({
            "route": "forum.get_boards",
            "receipt": "abc123",
            "data": {"section": 1}
        });
        let envelope = RequestEnvelope::parse(&body).unwrap();
        assert_eq!(envelope.route, "forum.get_boards");
        assert_eq!(envelope.receipt, Some(Receipt::Text("abc123".to_string())));
        assert_eq!(envelope.data, json!({"section": 1}));
    }

    #[test]
    fn test_parse_integer_receipt() {
        let body = json!({"route": "ping", "receipt": 42, "data": {}});
        let envelope = RequestEnvelope::parse(&body).unwrap();
        assert_eq!(envelope.receipt, Some(Receipt::Number(42)));
    }

    #[test]
    fn test_parse_missing_route() {
        let body = json!({"receipt": "r1", "data": {}});
        let err = RequestEnvelope::parse(&body).unwrap_err();
        // The receipt survives so the router can answer with a 400
        assert_eq!(err.receipt, Some(Receipt::Text("r1".to_string())));
    }

    #[test]
    fn test_parse_route_too_long() {
        let body = json!({
            "route": "a".repeat(MAX_ROUTE_LEN + 1),
            "receipt": 7,
            "data": {}
        });
        let err = RequestEnvelope::parse(&body).unwrap_err();
        assert_eq!(err.reason, "route is too long");
        assert_eq!(err.receipt, Some(Receipt::Number(7)));
    }

    #[test]
    fn test_parse_missing_data() {
        let body = json!({"route": "ping", "receipt": "r"});
        let err = RequestEnvelope::parse(&body).unwrap_err();
        assert_eq!(err.reason, "data is required");
    }

    #[test]
    fn test_parse_non_object_body_has_no_receipt() {
        let err = RequestEnvelope::parse(&json!("garbage")).unwrap_err();
        assert_eq!(err.receipt, None);
    }

    #[test]
    fn test_delivery_head_defaults() {
        let head: DeliveryHead = serde_json::from_value(json!({})).unwrap();
        assert_eq!(head.connection_id, None);
        assert!(!head.broadcast);
        assert!(!head.avoid_self);
        assert!(!head.is_control);
        assert_eq!(head.req_level, 0);
    }

    #[test]
    fn test_response_body_includes_receipt() {
        let receipt = Receipt::Text("r9".to_string());
        let body = response_body("news.get_news_posts", Some(&receipt), false, json!({"posts": []}));
        assert_eq!(body["receipt"], json!("r9"));
        assert_eq!(body["error"], json!(false));
        assert_eq!(body["route"], json!("news.get_news_posts"));
    }

    #[test]
    fn test_response_body_without_receipt() {
        let body = response_body("auth.login", None, true, json!({}));
        assert!(body.get("receipt").is_none());
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody::single(ERR_FORBIDDEN, "Forbidden");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["error_code"], json!(403));
        assert_eq!(value["error_messages"][0]["message"], json!("Forbidden"));
        assert!(value["error_messages"][0].get("field").is_none());
    }

    #[test]
    fn test_transport_envelope_roundtrip() {
        let envelope = TransportEnvelope {
            head: DeliveryHead {
                connection_id: Some("c1".to_string()),
                broadcast: true,
                avoid_self: true,
                is_control: false,
                req_level: 1,
            },
            body: json!({"route": "forum.insert_post", "error": false, "data": {}}),
        };
        let encoded = serde_json::to_string(&envelope).unwrap();
        let decoded: TransportEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }
}
