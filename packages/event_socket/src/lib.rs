//! Event Socket - resilient multiplexed WebSocket client
//!
//! One long-lived connection shared by every part of an application. The
//! socket reconnects on its own, notices peers that stop talking without
//! closing, and multiplexes any number of topics over the single connection,
//! telling the peer which topics currently have local listeners.
//!
//! Frames are `{event, data}` pairs, sent either as JSON text frames or as
//! MessagePack binary frames. Inbound frames are decoded by their transport
//! type, so a peer may answer in either encoding.
//!
//! # Example
//!
//! ```no_run
//! use event_socket::{Encoding, EventSocket, Payload};
//!
//! #[tokio::main]
//! async fn main() {
//!     let socket = EventSocket::init("ws://192.168.4.1/ws/events", Encoding::Json);
//!
//!     socket.on("open", |_: &Payload| println!("connected"));
//!     let telemetry = socket.on_data("telemetry", |data: serde_json::Value| {
//!         println!("telemetry: {data}");
//!     });
//!
//!     socket.wait_connected().await;
//!     socket.send_event("safestate", &serde_json::json!({"enabled": true}));
//!
//!     // later
//!     telemetry.unsubscribe();
//! }
//! ```

pub mod codec;
mod config;
mod connection;
mod error;
mod listener;
pub mod liveness;
pub mod registry;
pub mod transport;

pub use codec::{Codec, Encoding, Frame};
pub use config::SocketConfig;
pub use connection::{EventSocket, Subscription};
pub use error::{Result, SocketError};
pub use listener::{Listener, ListenerRef, Payload};
pub use transport::{CloseInfo, Connection, Connector, Inbound, WireFrame, WsConnector};
