//! JSON codecs for channel payloads and request/response bodies.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encodes a channel payload.
pub fn encode_payload<T: Serialize>(value: &T) -> ProtocolResult<Value> {
    serde_json::to_value(value).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a channel payload.
pub fn decode_payload<T: DeserializeOwned>(value: &Value) -> ProtocolResult<T> {
    T::deserialize(value).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Encodes a request or response body.
pub fn encode_body<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a request or response body.
///
/// An empty body decodes as JSON `null`, so unit-like bodies can be read
/// from bodiless responses.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    let bytes = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        bytes
    };
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Body {
        message: String,
    }

    #[test]
    fn body_codec() {
        let bytes = encode_body(&Body {
            message: "ok".into(),
        })
        .unwrap();
        assert_eq!(bytes, br#"{"message":"ok"}"#);

        let err = decode_body::<Body>(b"{").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn empty_body_is_null() {
        let unit: Option<Body> = decode_body(b"").unwrap();
        assert!(unit.is_none());
        assert!(decode_body::<Body>(b"").is_err());
    }
}
