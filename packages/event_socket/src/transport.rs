//! Physical transport seam.
//!
//! The connection manager only sees a [`Connector`] that yields a
//! [`Connection`]: a sink of outbound [`WireFrame`]s and a stream of
//! [`Inbound`] events. [`WsConnector`] is the tokio-tungstenite implementation;
//! tests plug in a channel-backed connector instead.

use std::pin::Pin;

use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use crate::error::{Result, SocketError};

/// One encoded message unit, typed at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl WireFrame {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Binary(bytes) => Message::Binary(bytes.into()),
        }
    }
}

/// Close details reported by the peer, when it sent any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Something that arrived on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(WireFrame),
    /// The peer closed the connection. A stream that simply ends is reported
    /// as `Closed(None)` by the connection manager.
    Closed(Option<CloseInfo>),
}

pub type FrameSink = Pin<Box<dyn Sink<WireFrame, Error = SocketError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<Inbound>>;

/// An open physical connection.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens physical connections. Resolving `Ok` is the transport's "opened"
/// signal; resolving `Err` is a failed attempt.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<Connection>>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<Connection>> {
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            let (ws_stream, response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
            debug!(%endpoint, status = %response.status(), "websocket handshake complete");

            let (ws_write, ws_read) = ws_stream.split();
            let sink = ws_write
                .with(|frame: WireFrame| {
                    future::ready(Ok::<_, tungstenite::Error>(frame.into_message()))
                })
                .sink_map_err(SocketError::from);
            let stream = ws_read.filter_map(|msg| future::ready(inbound_from_message(msg)));

            Ok(Connection::new(Box::pin(sink), stream.boxed()))
        })
    }
}

/// Map a tungstenite message to an inbound event. Control frames are handled
/// by tungstenite itself and never reach the connection manager.
fn inbound_from_message(
    msg: std::result::Result<Message, tungstenite::Error>,
) -> Option<Result<Inbound>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Inbound::Frame(WireFrame::Text(text.to_string())))),
        Ok(Message::Binary(bytes)) => Some(Ok(Inbound::Frame(WireFrame::Binary(bytes.to_vec())))),
        Ok(Message::Close(frame)) => Some(Ok(Inbound::Closed(frame.map(|f| CloseInfo {
            code: u16::from(f.code),
            reason: f.reason.to_string(),
        })))),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}
