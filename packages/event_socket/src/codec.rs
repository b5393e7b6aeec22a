//! Frame codec: JSON text frames or MessagePack binary frames.
//!
//! The encoding used for outbound frames is fixed when the socket is created.
//! Inbound frames are decoded by their transport type instead, so a client
//! configured for JSON still understands a peer that answers in MessagePack
//! and vice versa.
//!
//! MessagePack uses `rmp_serde::to_vec_named` so maps keep their field names
//! and stay readable by peers that expect the `{event, data}` object shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::transport::WireFrame;

/// Wire encoding for outbound frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// UTF-8 JSON in text frames.
    #[default]
    Json,
    /// MessagePack in binary frames.
    #[serde(alias = "binary")]
    MsgPack,
}

impl Encoding {
    pub fn is_binary(self) -> bool {
        matches!(self, Self::MsgPack)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::MsgPack => write!(f, "msgpack"),
        }
    }
}

/// The logical `{event, data}` unit exchanged with the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: Some(event.into()),
            data,
        }
    }

    /// Interpret a decoded value as a frame.
    ///
    /// Accepts `{"event": .., "data": ..}` and the compact `[event, data]`
    /// pair. Anything else is a frame without an event carrying the whole
    /// value as data.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.get("event").is_some_and(Value::is_string) => {
                let data = map.remove("data").unwrap_or(Value::Null);
                let event = match map.remove("event") {
                    Some(Value::String(event)) => Some(event),
                    _ => None,
                };
                Self { event, data }
            }
            Value::Array(items) if items.len() == 2 && items[0].is_string() => {
                let mut items = items.into_iter();
                let event = items.next().and_then(|v| match v {
                    Value::String(event) => Some(event),
                    _ => None,
                });
                let data = items.next().unwrap_or(Value::Null);
                Self { event, data }
            }
            other => Self {
                event: None,
                data: other,
            },
        }
    }
}

/// Stateless encoder/decoder bound to one outbound [`Encoding`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    encoding: Encoding,
}

impl Codec {
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encode any serializable value in the configured encoding.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<WireFrame> {
        match self.encoding {
            Encoding::Json => Ok(WireFrame::Text(serde_json::to_string(value)?)),
            Encoding::MsgPack => Ok(WireFrame::Binary(rmp_serde::to_vec_named(value)?)),
        }
    }

    /// Decode an inbound frame according to its transport type.
    pub fn decode(&self, frame: &WireFrame) -> Result<Value> {
        match frame {
            WireFrame::Text(text) => Ok(serde_json::from_str(text)?),
            WireFrame::Binary(bytes) => Ok(rmp_serde::from_slice(bytes)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SocketError;
    use serde_json::json;

    #[test]
    fn json_encodes_as_text() {
        let codec = Codec::new(Encoding::Json);
        let frame = Frame::new("subscribe", json!("telemetry"));
        let wire = codec.encode(&frame).unwrap();
        assert_eq!(
            wire,
            WireFrame::Text(r#"{"event":"subscribe","data":"telemetry"}"#.to_string())
        );
    }

    #[test]
    fn msgpack_encodes_as_binary_map() {
        let codec = Codec::new(Encoding::MsgPack);
        let wire = codec.encode(&Frame::new("rssi", json!(-67))).unwrap();
        let WireFrame::Binary(bytes) = wire else {
            panic!("expected binary frame");
        };
        // fixmap with two entries
        assert_eq!(bytes[0], 0x82);
    }

    #[test]
    fn msgpack_round_trip_representative_payloads() {
        let codec = Codec::new(Encoding::MsgPack);
        let payloads = [
            json!(42),
            json!(-7),
            json!(3.5),
            json!("hello"),
            json!(true),
            json!(null),
            json!([1, "two", [3.0, false]]),
            json!({"motor": {"rpm": 1200, "enabled": true}, "tags": ["a", "b"]}),
        ];
        for payload in payloads {
            let frame = Frame::new("state", payload.clone());
            let wire = codec.encode(&frame).unwrap();
            let decoded = Frame::from_value(codec.decode(&wire).unwrap());
            assert_eq!(decoded, frame, "payload {payload}");
        }
    }

    #[test]
    fn decode_follows_frame_type_not_local_mode() {
        let json_codec = Codec::new(Encoding::Json);
        let msgpack_codec = Codec::new(Encoding::MsgPack);
        let frame = Frame::new("analytics", json!({"uptime": 12}));

        let binary = msgpack_codec.encode(&frame).unwrap();
        let text = json_codec.encode(&frame).unwrap();

        assert_eq!(Frame::from_value(json_codec.decode(&binary).unwrap()), frame);
        assert_eq!(Frame::from_value(msgpack_codec.decode(&text).unwrap()), frame);
    }

    #[test]
    fn malformed_text_is_json_error() {
        let codec = Codec::new(Encoding::Json);
        let err = codec
            .decode(&WireFrame::Text("{not json".to_string()))
            .unwrap_err();
        assert!(matches!(err, SocketError::Json(_)));
    }

    #[test]
    fn malformed_binary_is_msgpack_error() {
        let codec = Codec::new(Encoding::MsgPack);
        // map header announcing one entry, then nothing
        let err = codec.decode(&WireFrame::Binary(vec![0x81])).unwrap_err();
        assert!(matches!(err, SocketError::MsgPackDecode(_)));
    }

    #[test]
    fn frame_from_pair() {
        let frame = Frame::from_value(json!(["telemetry", {"v": 1}]));
        assert_eq!(frame, Frame::new("telemetry", json!({"v": 1})));
    }

    #[test]
    fn frame_without_event() {
        let frame = Frame::from_value(json!({"data": 5}));
        assert_eq!(frame.event, None);
        assert_eq!(frame.data, json!({"data": 5}));

        let frame = Frame::from_value(json!("plain"));
        assert_eq!(frame.event, None);
        assert_eq!(frame.data, json!("plain"));
    }

    #[test]
    fn frame_with_missing_data() {
        let frame = Frame::from_value(json!({"event": "ping"}));
        assert_eq!(frame, Frame::new("ping", Value::Null));
    }

    #[test]
    fn encoding_names() {
        let enc: Encoding = serde_json::from_str(r#""msgpack""#).unwrap();
        assert_eq!(enc, Encoding::MsgPack);
        let enc: Encoding = serde_json::from_str(r#""binary""#).unwrap();
        assert_eq!(enc, Encoding::MsgPack);
        assert_eq!(Encoding::Json.to_string(), "json");
        assert!(!Encoding::default().is_binary());
    }
}
