//! Listener callbacks and the payloads they receive.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SocketError};
use crate::transport::CloseInfo;

/// What a listener is handed on dispatch.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Decoded application data (topic listeners) or a whole decoded frame
    /// (`json` listeners).
    Data(Value),
    /// Raw text of an inbound text frame (`message` listeners).
    Text(String),
    /// Raw bytes of an inbound binary frame (`binary` listeners).
    Binary(Vec<u8>),
    /// The connection opened (`open` listeners).
    Opened,
    /// The peer closed the connection (`close` listeners).
    Closed(Option<CloseInfo>),
    /// Transport or decode failure (`error` listeners).
    Error(Arc<SocketError>),
    /// No frame arrived within the liveness deadline (`unresponsive` listeners).
    Unresponsive,
}

impl Payload {
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Deserialize the data carried by this payload into a caller type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Data(value) => Ok(T::deserialize(value)?),
            other => Err(SocketError::UnexpectedPayload(other.kind())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Text(_) => "message",
            Self::Binary(_) => "binary",
            Self::Opened => "open",
            Self::Closed(_) => "close",
            Self::Error(_) => "error",
            Self::Unresponsive => "unresponsive",
        }
    }
}

/// Observer invoked for every frame on a topic it is registered for.
pub trait Listener: Send + Sync + 'static {
    fn on_event(&self, payload: &Payload);
}

impl<F> Listener for F
where
    F: Fn(&Payload) + Send + Sync + 'static,
{
    fn on_event(&self, payload: &Payload) {
        self(payload)
    }
}

/// Shared handle to a listener. Two refs are equal only when they point at
/// the same listener, which gives the registry its per-callback set
/// semantics.
#[derive(Clone)]
pub struct ListenerRef(Arc<dyn Listener>);

impl ListenerRef {
    pub fn new(listener: impl Listener) -> Self {
        Self(Arc::new(listener))
    }

    pub fn from_arc(listener: Arc<dyn Listener>) -> Self {
        Self(listener)
    }

    pub fn call(&self, payload: &Payload) {
        self.0.on_event(payload);
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for ListenerRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for ListenerRef {}

impl fmt::Debug for ListenerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerRef({:p})", self.addr())
    }
}
