//! Error types for the event socket.

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Connect, read or write failure on the WebSocket.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Text frame that is not valid JSON, or a payload that does not fit the
    /// type a listener asked for.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The peer went away while a frame was being written.
    #[error("connection closed")]
    Closed,

    /// A listener asked for data from a lifecycle payload.
    #[error("payload carries no data: {0}")]
    UnexpectedPayload(&'static str),
}

impl SocketError {
    /// True for errors that come from the transport rather than from a
    /// single frame's contents.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::Closed)
    }
}

pub type Result<T> = std::result::Result<T, SocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(SocketError::Closed.is_transport());
        assert!(SocketError::WebSocket(tungstenite::Error::ConnectionClosed).is_transport());

        let json = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(!SocketError::Json(json).is_transport());
        assert!(!SocketError::UnexpectedPayload("open").is_transport());
    }

    #[test]
    fn display_messages() {
        assert_eq!(SocketError::Closed.to_string(), "connection closed");
        assert_eq!(
            SocketError::UnexpectedPayload("close").to_string(),
            "payload carries no data: close"
        );
    }
}
