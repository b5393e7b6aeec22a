use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use event_socket::{Encoding, EventSocket, Payload, Subscription};
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

mod config;

use config::{CliOverrides, FileConfig, SocketOverrides, load_config};

#[derive(Parser)]
#[command(name = "evsock")]
#[command(about = "Tail and publish events on a multiplexed WebSocket")]
struct Cli {
    /// Topics to subscribe to; every frame is printed as one JSON line
    topics: Vec<String>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket URL, e.g. ws://10.0.0.5/ws/events
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Outbound frame encoding
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Publish one event on this topic once connected
    #[arg(long)]
    publish: Option<String>,

    /// JSON payload for --publish (default: null)
    #[arg(long, requires = "publish")]
    data: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum EncodingArg {
    Json,
    Msgpack,
}

impl From<EncodingArg> for Encoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Json => Encoding::Json,
            EncodingArg::Msgpack => Encoding::MsgPack,
        }
    }
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            socket: SocketOverrides {
                endpoint: self.endpoint.clone(),
                encoding: self.encoding.map(Encoding::from),
            },
            topics: self.topics.clone(),
        }
    }

    fn publication(&self) -> Result<Option<(String, Value)>> {
        let Some(topic) = self.publish.clone() else {
            return Ok(None);
        };
        let data = match &self.data {
            Some(raw) => serde_json::from_str(raw).context("--data is not valid JSON")?,
            None => Value::Null,
        };
        Ok(Some((topic, data)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries frames, logs go to stderr
    let default_directive = if cli.debug {
        "evsock=debug,event_socket=debug,info"
    } else {
        "evsock=info,event_socket=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    if let Some(path) = cli.config.as_ref().filter(|path| !path.exists()) {
        bail!("config file {} does not exist", path.display());
    }
    let fc: FileConfig = load_config(cli.config.as_deref(), &cli.overrides())
        .extract()
        .context("Failed to load configuration")?;
    if fc.socket.endpoint.is_empty() {
        bail!("no endpoint configured");
    }
    let publication = cli.publication()?;

    run(fc, publication).await
}

async fn run(fc: FileConfig, mut publication: Option<(String, Value)>) -> Result<()> {
    let endpoint = fc.socket.endpoint.clone();
    let socket = EventSocket::from_config(fc.socket);

    let _subscriptions: Vec<Subscription> = fc
        .topics
        .iter()
        .map(|topic| socket.on(topic, print_frames(topic)))
        .collect();
    if fc.topics.is_empty() {
        info!("no topics given, only watching the connection");
    }

    let mut connected = socket.connected();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("interrupted, shutting down");
                return Ok(());
            }
            changed = connected.changed() => {
                if changed.is_err() {
                    bail!("event socket stopped unexpectedly");
                }
                let up = *connected.borrow_and_update();
                if !up {
                    warn!(%endpoint, "disconnected, retrying");
                    continue;
                }
                info!(%endpoint, "connected");
                if let Some((topic, data)) = publication.take() {
                    socket.send_event(&topic, &data);
                    info!(topic = %topic, "published event");
                }
            }
        }
    }
}

fn print_frames(topic: &str) -> impl Fn(&Payload) + Send + Sync + 'static {
    let topic = topic.to_string();
    move |payload: &Payload| println!("{}", json!({"topic": topic, "data": describe(payload)}))
}

/// JSON rendering of any payload, lifecycle payloads included, so reserved
/// topics can be tailed too.
fn describe(payload: &Payload) -> Value {
    match payload {
        Payload::Data(value) => value.clone(),
        Payload::Text(text) => Value::String(text.clone()),
        Payload::Binary(bytes) => json!(bytes),
        Payload::Opened => json!("open"),
        Payload::Closed(Some(info)) => json!({"code": info.code, "reason": info.reason}),
        Payload::Closed(None) => Value::Null,
        Payload::Error(e) => Value::String(e.to_string()),
        Payload::Unresponsive => json!("unresponsive"),
    }
}
