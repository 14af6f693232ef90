//! mpv JSON IPC client and the [`PlaybackHost`] adapter built on it.
//!
//! mpv speaks newline-delimited JSON over its `--input-ipc-server` socket.
//! Requests carry a `request_id` that the matching reply echoes back; events
//! (`property-change`, `client-message`, `shutdown`) arrive unsolicited on the
//! same stream. A reader task routes replies to their waiting request and
//! turns events into [`HostEvent`]s for the controller.

use crate::classifier::{KeyEvent, RampCommand};
use crate::config::{Config, FeedbackStyle};
use crate::controller::HostEvent;
use crate::error::HostError;
use crate::feedback;
use crate::host::{sanitize_speed, Feedback, PlaybackHost};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// First argument of every `script-message` addressed to this daemon.
pub const MESSAGE_TARGET: &str = "seek-ramp";

/// Properties mirrored through `observe_property`.
pub const OBSERVED_PROPERTIES: [&str; 4] = ["speed", "sid", "sub-start", "pause"];

/// How long a request may wait for its reply.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Incoming>>>>;

/// Any line mpv sends: a reply, an event, or both shapes' union.
#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    request_id: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    args: Vec<Value>,
}

/// Last known values of the observed properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMirror {
    pub speed: f64,
    /// A subtitle track is selected
    pub subtitle_track: bool,
    /// A subtitle line is on screen (`sub-start` is set)
    pub subtitle_shown: bool,
    pub paused: bool,
}

impl Default for PropertyMirror {
    fn default() -> Self {
        Self {
            speed: 1.0,
            subtitle_track: false,
            subtitle_shown: false,
            paused: false,
        }
    }
}

impl PropertyMirror {
    /// Record a property change. Returns an event when pause flips.
    pub fn apply(&mut self, name: &str, data: &Value) -> Option<HostEvent> {
        match name {
            "speed" => self.speed = sanitize_speed(data.as_f64().unwrap_or(1.0)),
            // `sid` is the track number, or false/"no" when subtitles are off
            "sid" => self.subtitle_track = data.is_number(),
            "sub-start" => self.subtitle_shown = data.is_number(),
            "pause" => {
                let paused = data.as_bool().unwrap_or(false);
                if paused != self.paused {
                    self.paused = paused;
                    return Some(HostEvent::Paused(paused));
                }
            }
            _ => debug!("Ignoring change of unobserved property {}", name),
        }
        None
    }

    pub fn subtitle_visible(&self) -> bool {
        self.subtitle_track && self.subtitle_shown
    }
}

/// Parse the arguments of a `client-message` event.
///
/// Messages for other scripts yield `Ok(None)`.
pub fn parse_client_message(args: &[String]) -> Result<Option<HostEvent>, HostError> {
    let Some((target, rest)) = args.split_first() else {
        return Ok(None);
    };
    if target != MESSAGE_TARGET {
        return Ok(None);
    }

    let invalid = || HostError::InvalidMessage(args.join(" "));
    let event = match rest {
        [key, transition] if key == "key" => {
            HostEvent::Key(KeyEvent::parse(transition).ok_or_else(invalid)?)
        }
        [set, key, value] if set == "set" => HostEvent::SetOption {
            key: key.clone(),
            value: value.clone(),
        },
        [command] => HostEvent::Command(RampCommand::parse(command).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(Some(event))
}

/// Request/response client for one mpv IPC connection.
pub struct MpvClient {
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    mirror: Arc<RwLock<PropertyMirror>>,
    reader: JoinHandle<()>,
}

impl MpvClient {
    /// Connect to the socket and start routing. Events arrive on the returned
    /// receiver, which closes when the connection does.
    pub async fn connect(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HostEvent>), HostError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| HostError::ConnectFailed {
                path: path.display().to_string(),
                source: e,
            })?;
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let mirror = Arc::new(RwLock::new(PropertyMirror::default()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&mirror),
            events_tx,
        ));

        info!("Connected to mpv at {:?}", path);
        Ok((
            Self {
                writer: Mutex::new(writer),
                pending,
                next_id: AtomicU64::new(1),
                mirror,
                reader,
            },
            events_rx,
        ))
    }

    /// Send a command (array or named-argument object) and wait for its reply.
    pub async fn command(&self, command: Value) -> Result<Value, HostError> {
        if self.reader.is_finished() {
            return Err(HostError::ConnectionDropped);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(id, reply_tx);

        let mut line = serde_json::to_string(&json!({ "command": command, "request_id": id }))?;
        line.push('\n');

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(line.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(HostError::IoError(e));
        }

        let reply = match tokio::time::timeout(COMMAND_TIMEOUT, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(HostError::ConnectionDropped),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(HostError::Timeout(command.to_string()));
            }
        };

        match reply.error.as_deref() {
            None | Some("success") => Ok(reply.data),
            Some(error) => Err(HostError::CommandFailed {
                command: command.to_string(),
                error: error.to_string(),
            }),
        }
    }

    pub async fn get_property(&self, name: &str) -> Result<Value, HostError> {
        self.command(json!(["get_property", name])).await
    }

    pub async fn set_property(&self, name: &str, value: Value) -> Result<(), HostError> {
        self.command(json!(["set_property", name, value])).await?;
        Ok(())
    }

    /// Subscribe to change events for every mirrored property.
    pub async fn observe_properties(&self) -> Result<(), HostError> {
        for (id, name) in OBSERVED_PROPERTIES.iter().enumerate() {
            self.command(json!(["observe_property", id + 1, name])).await?;
        }
        Ok(())
    }

    pub async fn mirror(&self) -> PropertyMirror {
        self.mirror.read().await.clone()
    }
}

impl Drop for MpvClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    reader: OwnedReadHalf,
    pending: Pending,
    mirror: Arc<RwLock<PropertyMirror>>,
    events: mpsc::UnboundedSender<HostEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Error reading from mpv socket: {}", e);
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message: Incoming = match serde_json::from_str(trimmed) {
            Ok(message) => message,
            Err(e) => {
                debug!("Skipping unreadable mpv message: {}", e);
                continue;
            }
        };

        if message.event.is_some() {
            if let Some(event) = route_event(message, &mirror).await {
                if events.send(event).is_err() {
                    break;
                }
            }
        } else if let Some(id) = message.request_id {
            if let Some(reply_tx) = pending.lock().await.remove(&id) {
                let _ = reply_tx.send(message);
            }
        }
    }

    // Dropping the senders fails every in-flight request with ConnectionDropped
    pending.lock().await.clear();
    debug!("mpv reader stopped");
}

async fn route_event(message: Incoming, mirror: &RwLock<PropertyMirror>) -> Option<HostEvent> {
    match message.event.as_deref()? {
        "property-change" => {
            let name = message.name.as_deref()?;
            mirror.write().await.apply(name, &message.data)
        }
        "client-message" => {
            let args: Vec<String> = message
                .args
                .iter()
                .map(|arg| match arg {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            match parse_client_message(&args) {
                Ok(event) => event,
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            }
        }
        "shutdown" => Some(HostEvent::Shutdown),
        _ => None,
    }
}

/// [`PlaybackHost`] backed by a live mpv connection.
///
/// Failed reads degrade to neutral values and failed writes are logged; a
/// dead connection surfaces to the controller through the closed event
/// channel, not through these calls.
pub struct MpvHost {
    client: MpvClient,
    style: FeedbackStyle,
}

impl MpvHost {
    pub fn new(client: MpvClient, style: FeedbackStyle) -> Self {
        Self { client, style }
    }

    async fn read_f64(&self, name: &str) -> Option<f64> {
        match self.client.get_property(name).await {
            Ok(value) => {
                let number = value.as_f64();
                if number.is_none() {
                    warn!("Property {} is not a number: {}", name, value);
                }
                number
            }
            Err(e) => {
                warn!("Failed to read {}: {}", name, e);
                None
            }
        }
    }

    async fn run(&self, command: Value) {
        if let Err(e) = self.client.command(command).await {
            warn!("mpv command failed: {}", e);
        }
    }
}

impl PlaybackHost for MpvHost {
    async fn speed(&mut self) -> f64 {
        match self.read_f64("speed").await {
            Some(speed) => sanitize_speed(speed),
            None => self.client.mirror().await.speed,
        }
    }

    async fn set_speed(&mut self, speed: f64) {
        if let Err(e) = self.client.set_property("speed", json!(speed)).await {
            warn!("Failed to set speed to {}: {}", speed, e);
        }
    }

    async fn has_subtitle(&mut self) -> bool {
        self.client.mirror().await.subtitle_visible()
    }

    async fn next_subtitle_offset(&mut self) -> Option<f64> {
        // Without a readable baseline the delay cannot be restored
        let before = self.read_f64("sub-delay").await?;
        self.run(json!({ "name": "sub-step", "skip": 1, "_flags": ["no-osd"] }))
            .await;
        let after = self.read_f64("sub-delay").await;

        if let Err(e) = self.client.set_property("sub-delay", json!(before)).await {
            warn!("Failed to restore sub-delay to {}: {}", before, e);
        }

        // sub-step shifts the delay so the next line starts now
        let offset = before - after?;
        (offset != 0.0).then_some(offset)
    }

    async fn seek(&mut self, delta: f64) {
        self.run(json!({
            "name": "seek",
            "target": delta,
            "flags": "relative+exact",
            "_flags": ["no-osd"],
        }))
        .await;
    }

    async fn show_feedback(&mut self, feedback: Feedback, toggled: bool) {
        for command in feedback::render(self.style, feedback, toggled) {
            self.run(command).await;
        }
    }

    fn apply_config(&mut self, config: &Config) {
        self.style = config.feedback;
    }
}
