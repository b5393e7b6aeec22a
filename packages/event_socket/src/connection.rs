//! Connection manager: owns the physical connection, drives the
//! connect → fail → retry cycle and routes frames between the codec and the
//! topic registry.
//!
//! All state lives in one actor task. [`EventSocket`] is a cheap cloneable
//! handle that talks to it over a command channel, so listeners, timers and
//! transport callbacks never run concurrently with each other.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::codec::{Codec, Encoding, Frame};
use crate::config::SocketConfig;
use crate::error::{Result, SocketError};
use crate::listener::{ListenerRef, Payload};
use crate::liveness::{Deadline, LivenessMonitor};
use crate::registry::{Control, TopicRegistry, is_reserved};
use crate::transport::{
    CloseInfo, Connection, Connector, FrameSink, FrameStream, Inbound, WireFrame, WsConnector,
};

/// How long a discarded connection gets to finish its close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Command {
    On {
        topic: String,
        listener: ListenerRef,
    },
    Off {
        topic: String,
        listener: Option<ListenerRef>,
    },
    Send {
        value: Value,
    },
}

/// Why a connection went down.
#[derive(Debug)]
enum Disconnect {
    Error(SocketError),
    Closed(Option<CloseInfo>),
    Unresponsive,
}

impl Disconnect {
    fn topic(&self) -> &'static str {
        match self {
            Self::Error(_) => "error",
            Self::Closed(_) => "close",
            Self::Unresponsive => "unresponsive",
        }
    }

    fn into_payload(self) -> Payload {
        match self {
            Self::Error(e) => Payload::Error(Arc::new(e)),
            Self::Closed(info) => Payload::Closed(info),
            Self::Unresponsive => Payload::Unresponsive,
        }
    }
}

/// Handle to the shared multiplexed connection.
///
/// Create one at startup and clone it into every collaborator. The actor
/// keeps reconnecting for as long as any handle or [`Subscription`] is alive.
#[derive(Clone)]
pub struct EventSocket {
    commands: mpsc::UnboundedSender<Command>,
    connected: watch::Receiver<bool>,
}

impl EventSocket {
    /// Connect to `endpoint` over WebSocket, sending frames in `encoding`.
    /// Must be called from within a tokio runtime.
    pub fn init(endpoint: impl Into<String>, encoding: Encoding) -> Self {
        Self::from_config(SocketConfig::new(endpoint, encoding))
    }

    pub fn from_config(config: SocketConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Start the connection actor on a custom transport.
    pub fn with_connector(config: SocketConfig, connector: Arc<dyn Connector>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);
        let actor = SocketActor::new(config, connector, rx, connected_tx);
        tokio::spawn(actor.run());
        Self {
            commands,
            connected,
        }
    }

    /// Register a callback for `topic`. The first listener of an application
    /// topic announces interest to the peer.
    pub fn on<F>(&self, topic: &str, listener: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.on_listener(topic, ListenerRef::new(listener))
    }

    /// Register a typed callback. Frames whose data does not deserialize into
    /// `T` are logged and skipped.
    pub fn on_data<T, F>(&self, topic: &str, listener: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = topic.to_string();
        self.on(topic, move |payload: &Payload| match payload.decode::<T>() {
            Ok(value) => listener(value),
            Err(e) => warn!(topic = %name, error = %e, "payload does not match listener type"),
        })
    }

    /// Register an existing listener. Registering the same listener twice on
    /// one topic has no effect.
    pub fn on_listener(&self, topic: &str, listener: ListenerRef) -> Subscription {
        self.command(Command::On {
            topic: topic.to_string(),
            listener: listener.clone(),
        });
        Subscription {
            topic: topic.to_string(),
            listener,
            commands: self.commands.clone(),
        }
    }

    /// Remove `listener` from `topic`, or every listener when `None`.
    pub fn off(&self, topic: &str, listener: Option<&ListenerRef>) {
        self.command(Command::Off {
            topic: topic.to_string(),
            listener: listener.cloned(),
        });
    }

    /// Send a raw payload. Silently dropped unless connected.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.command(Command::Send { value }),
            Err(e) => warn!(error = %e, "failed to serialize outbound payload"),
        }
    }

    /// Send `{event: topic, data: payload}`. Silently dropped unless connected.
    pub fn send_event<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(data) => self.send(&Frame::new(topic, data)),
            Err(e) => warn!(topic = %topic, error = %e, "failed to serialize event payload"),
        }
    }

    /// Observable connection flag: `true` only while connected.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until the socket is connected. Returns `false` if the actor has
    /// stopped.
    pub async fn wait_connected(&self) -> bool {
        let mut connected = self.connected.clone();
        connected.wait_for(|up| *up).await.is_ok()
    }

    fn command(&self, command: Command) {
        send_command(&self.commands, command);
    }
}

fn send_command(commands: &mpsc::UnboundedSender<Command>, command: Command) {
    if commands.send(command).is_err() {
        debug!("event socket actor has stopped, dropping command");
    }
}

/// Returned by [`EventSocket::on`]; removes its listener again.
pub struct Subscription {
    topic: String,
    listener: ListenerRef,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn listener(&self) -> &ListenerRef {
        &self.listener
    }

    pub fn unsubscribe(self) {
        send_command(
            &self.commands,
            Command::Off {
                topic: self.topic,
                listener: Some(self.listener),
            },
        );
    }
}

/// A pending connect, resolving to the opened connection.
type ConnectAttempt = BoxFuture<'static, Result<Connection>>;

enum Event {
    Command(Command),
    Attempt(Result<Connection>),
    Inbound(Result<Inbound>),
    WriteFailed(SocketError),
    Reconnect,
    Unresponsive,
}

struct SocketActor {
    endpoint: String,
    codec: Codec,
    connector: Arc<dyn Connector>,
    registry: TopicRegistry,
    state: ConnectionState,
    commands: mpsc::UnboundedReceiver<Command>,
    connected: watch::Sender<bool>,
    attempt: Option<ConnectAttempt>,
    writer: Option<Writer>,
    stream: Option<FrameStream>,
    liveness: LivenessMonitor,
    reconnect: Deadline,
    reconnect_delay: Duration,
    arm_on_open: bool,
    attempts: u64,
}

/// Outbound half of an open connection. Frames are queued to a dedicated
/// task so a peer that stops reading never stalls the actor.
struct Writer {
    frames: mpsc::UnboundedSender<WireFrame>,
    failed: Option<oneshot::Receiver<SocketError>>,
    task: JoinHandle<()>,
}

impl Writer {
    fn spawn(sink: FrameSink) -> Self {
        let (frames, rx) = mpsc::unbounded_channel();
        let (failed_tx, failed) = oneshot::channel();
        let task = tokio::spawn(write_frames(sink, rx, failed_tx));
        Self {
            frames,
            failed: Some(failed),
            task,
        }
    }

    /// Stop accepting frames and give the task `CLOSE_GRACE` to flush and
    /// close before it is aborted.
    fn shutdown(self) {
        let Self { frames, task, .. } = self;
        drop(frames);
        let abort = task.abort_handle();
        tokio::spawn(async move {
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                debug!("writer did not finish closing, aborting");
                abort.abort();
            }
        });
    }
}

async fn write_frames(
    mut sink: FrameSink,
    mut frames: mpsc::UnboundedReceiver<WireFrame>,
    failed: oneshot::Sender<SocketError>,
) {
    while let Some(frame) = frames.recv().await {
        trace!(bytes = frame.len(), "sending frame");
        if let Err(e) = sink.send(frame).await {
            let _ = failed.send(e);
            return;
        }
    }
    let _ = sink.close().await;
}

impl SocketActor {
    fn new(
        config: SocketConfig,
        connector: Arc<dyn Connector>,
        commands: mpsc::UnboundedReceiver<Command>,
        connected: watch::Sender<bool>,
    ) -> Self {
        Self {
            codec: Codec::new(config.encoding),
            liveness: LivenessMonitor::new(config.unresponsive_timeout()),
            reconnect_delay: config.reconnect_delay(),
            arm_on_open: config.arm_on_open,
            endpoint: config.endpoint,
            connector,
            registry: TopicRegistry::new(),
            state: ConnectionState::Disconnected,
            commands,
            connected,
            attempt: None,
            writer: None,
            stream: None,
            reconnect: Deadline::new(),
            attempts: 0,
        }
    }

    async fn run(mut self) {
        info!(
            endpoint = %self.endpoint,
            encoding = %self.codec.encoding(),
            "starting event socket"
        );
        self.connect();

        loop {
            let event = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => Event::Command(cmd),
                    None => break,
                },
                result = next_attempt(&mut self.attempt) => Event::Attempt(result),
                inbound = next_inbound(&mut self.stream) => Event::Inbound(inbound),
                e = next_write_failure(&mut self.writer) => Event::WriteFailed(e),
                () = self.reconnect.expired() => Event::Reconnect,
                () = self.liveness.unresponsive() => Event::Unresponsive,
            };

            match event {
                Event::Command(cmd) => self.handle_command(cmd),
                Event::Attempt(Ok(conn)) => self.handle_open(conn),
                Event::Attempt(Err(e)) => self.disconnect(Disconnect::Error(e)),
                Event::Inbound(Ok(Inbound::Frame(frame))) => self.handle_frame(frame),
                Event::Inbound(Ok(Inbound::Closed(info))) => {
                    self.disconnect(Disconnect::Closed(info))
                }
                Event::Inbound(Err(e)) | Event::WriteFailed(e) => {
                    self.disconnect(Disconnect::Error(e))
                }
                Event::Reconnect => self.connect(),
                Event::Unresponsive => {
                    warn!(
                        endpoint = %self.endpoint,
                        timeout_ms = self.liveness.timeout().as_millis() as u64,
                        "peer unresponsive"
                    );
                    self.disconnect(Disconnect::Unresponsive);
                }
            }
        }

        self.close_connection();
        debug!(endpoint = %self.endpoint, "event socket stopped");
    }

    fn connect(&mut self) {
        self.attempts += 1;
        debug!(endpoint = %self.endpoint, attempt = self.attempts, "connecting");
        self.set_state(ConnectionState::Connecting);
        self.attempt = Some(self.connector.connect(&self.endpoint));
    }

    fn handle_open(&mut self, conn: Connection) {
        info!(endpoint = %self.endpoint, attempt = self.attempts, "connected");
        self.writer = Some(Writer::spawn(conn.sink));
        self.stream = Some(conn.stream);
        self.reconnect.disarm();
        self.set_state(ConnectionState::Connected);
        if self.arm_on_open {
            self.liveness.reset();
        }

        self.registry.dispatch("open", &Payload::Opened);

        // The peer forgets subscriptions with the old connection.
        let topics: Vec<String> = self
            .registry
            .application_topics()
            .map(str::to_string)
            .collect();
        for topic in topics {
            self.announce(Control::Subscribe(topic));
        }
    }

    fn disconnect(&mut self, reason: Disconnect) {
        match &reason {
            Disconnect::Error(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "connection failed")
            }
            Disconnect::Closed(Some(info)) => info!(
                endpoint = %self.endpoint,
                code = info.code,
                reason = %info.reason,
                "connection closed by peer"
            ),
            Disconnect::Closed(None) => info!(endpoint = %self.endpoint, "connection closed"),
            Disconnect::Unresponsive => {}
        }

        self.close_connection();
        self.set_state(ConnectionState::Disconnected);
        self.liveness.disarm();
        self.registry
            .dispatch(reason.topic(), &reason.into_payload());

        debug!(
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.reconnect.arm(self.reconnect_delay);
    }

    /// Drop the pending attempt and the current connection. The writer
    /// finishes the close handshake in the background.
    fn close_connection(&mut self) {
        self.attempt = None;
        self.stream = None;
        if let Some(writer) = self.writer.take() {
            writer.shutdown();
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::On { topic, listener } => {
                if let Some(control) = self.registry.add(&topic, listener) {
                    self.announce(control);
                }
            }
            Command::Off { topic, listener } => {
                if let Some(control) = self.registry.remove(&topic, listener.as_ref()) {
                    self.announce(control);
                }
            }
            Command::Send { value } => self.transmit(&value),
        }
    }

    fn announce(&mut self, control: Control) {
        if self.state != ConnectionState::Connected {
            // Subscriptions are replayed on open; unsubscribes die with the
            // connection.
            trace!(topic = %control.topic(), "not connected, deferring announcement");
            return;
        }
        debug!(?control, "announcing topic interest");
        self.transmit(&control.into_frame());
    }

    fn transmit<T: Serialize + ?Sized>(&mut self, value: &T) {
        if self.state != ConnectionState::Connected {
            trace!("not connected, dropping outbound frame");
            return;
        }
        let frame = match self.codec.encode(value) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound frame");
                return;
            }
        };
        let Some(writer) = self.writer.as_ref() else {
            return;
        };
        if writer.frames.send(frame).is_err() {
            // The writer already failed; its error is on the way.
            trace!("writer gone, dropping outbound frame");
        }
    }

    fn handle_frame(&mut self, frame: WireFrame) {
        self.liveness.reset();
        let decoded = self.codec.decode(&frame);

        match frame {
            WireFrame::Text(text) => self.registry.dispatch("message", &Payload::Text(text)),
            WireFrame::Binary(bytes) => self.registry.dispatch("binary", &Payload::Binary(bytes)),
        };

        let value = match decoded {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to decode inbound frame");
                self.registry
                    .dispatch("error", &Payload::Error(Arc::new(e)));
                return;
            }
        };

        if self.registry.contains("json") {
            self.registry
                .dispatch("json", &Payload::Data(value.clone()));
        }

        let Frame { event, data } = Frame::from_value(value);
        match event {
            Some(topic) if is_reserved(&topic) => {
                debug!(topic = %topic, "ignoring inbound frame on a reserved topic");
            }
            Some(topic) => {
                let delivered = self.registry.dispatch(&topic, &Payload::Data(data));
                trace!(topic = %topic, listeners = delivered, "dispatched frame");
            }
            None => {}
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        trace!(from = ?self.state, to = ?state, "connection state");
        self.state = state;
        let up = state == ConnectionState::Connected;
        self.connected.send_if_modified(|current| {
            if *current == up {
                return false;
            }
            *current = up;
            true
        });
    }
}

async fn next_attempt(attempt: &mut Option<ConnectAttempt>) -> Result<Connection> {
    let Some(pending_attempt) = attempt.as_mut() else {
        return pending().await;
    };
    let result = pending_attempt.await;
    *attempt = None;
    result
}

async fn next_inbound(stream: &mut Option<FrameStream>) -> Result<Inbound> {
    let Some(stream) = stream.as_mut() else {
        return pending().await;
    };
    stream.next().await.unwrap_or(Ok(Inbound::Closed(None)))
}

async fn next_write_failure(writer: &mut Option<Writer>) -> SocketError {
    let Some(failed) = writer.as_mut().and_then(|w| w.failed.as_mut()) else {
        return pending().await;
    };
    let result = failed.await;
    if let Some(writer) = writer.as_mut() {
        writer.failed = None;
    }
    match result {
        Ok(e) => e,
        // writer finished without failing
        Err(_) => pending().await,
    }
}
