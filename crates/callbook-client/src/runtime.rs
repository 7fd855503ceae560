//! Tokio driver for [`ClientCore`].
//!
//! Every effect becomes a spawned task whose result re-enters the event loop
//! as a [`ClientInput`]. The core discards results that arrive too late, so
//! tasks are cancelled on a best-effort basis only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use callbook_core::config::{ClientConfig, Config};
use callbook_core::error::{CallbookError, Result};
use callbook_core::protocol::ServerMessage;
use callbook_media::{HttpTranscriber, SpeechToText};

use crate::devices::{AudioPlayer, CaptureDevice, CommandCapture, CommandPlayer};
use crate::machine::{ClientCore, ClientEffect, ClientInput};
use crate::session::{PlaybackId, Status};

#[derive(Debug)]
enum Event {
    Input(ClientInput),
    /// Tagged with the connection attempt that produced it.
    Channel { generation: u64, input: ClientInput },
}

/// Operator controls for a running client.
#[derive(Clone)]
pub struct ClientHandle {
    events: mpsc::UnboundedSender<Event>,
}

impl ClientHandle {
    pub fn start(&self) {
        self.send(ClientInput::Start);
    }

    pub fn stop(&self) {
        self.send(ClientInput::Stop);
    }

    pub fn hangup(&self) {
        self.send(ClientInput::Hangup);
    }

    fn send(&self, input: ClientInput) {
        if self.events.send(Event::Input(input)).is_err() {
            debug!("Client runtime has stopped");
        }
    }
}

struct Channel {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

pub struct ClientRuntime {
    core: ClientCore,
    server_url: String,
    http_origin: String,
    connect_timeout: Duration,
    stt: Arc<dyn SpeechToText>,
    capture: Arc<dyn CaptureDevice>,
    player: Arc<dyn AudioPlayer>,
    http: reqwest::Client,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    status_tx: mpsc::UnboundedSender<Status>,
    status_rx: Option<mpsc::UnboundedReceiver<Status>>,
    generation: u64,
    channel: Option<Channel>,
    captures: HashMap<u64, CancellationToken>,
    playbacks: HashMap<PlaybackId, CancellationToken>,
}

/// HTTP origin that relative audio refs resolve against.
pub fn http_origin(server_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(server_url)
        .map_err(|e| CallbookError::Config(format!("invalid server URL {server_url}: {e}")))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(CallbookError::Config(format!(
                "unsupported server URL scheme: {other}"
            )));
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| CallbookError::Config(format!("server URL has no host: {server_url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    })
}

fn resolve_audio_url(origin: &str, audio_ref: &str) -> String {
    if audio_ref.starts_with("http://") || audio_ref.starts_with("https://") {
        audio_ref.to_string()
    } else {
        format!("{origin}{audio_ref}")
    }
}

impl ClientRuntime {
    pub fn new(
        core: ClientCore,
        config: &ClientConfig,
        stt: Arc<dyn SpeechToText>,
        capture: Arc<dyn CaptureDevice>,
        player: Arc<dyn AudioPlayer>,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        Ok(Self {
            core,
            http_origin: http_origin(&config.server_url)?,
            server_url: config.server_url.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            stt,
            capture,
            player,
            http: reqwest::Client::new(),
            events_tx,
            events_rx,
            status_tx,
            status_rx: Some(status_rx),
            generation: 0,
            channel: None,
            captures: HashMap::new(),
            playbacks: HashMap::new(),
        })
    }

    /// Wire up the HTTP transcriber and command-backed devices from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = config.client();
        let stt = HttpTranscriber::from_config(&config.transcription())?;
        Self::new(
            ClientCore::from_config(config),
            &client,
            Arc::new(stt),
            Arc::new(CommandCapture::from_config(&client)),
            Arc::new(CommandPlayer::from_config(&client)),
        )
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            events: self.events_tx.clone(),
        }
    }

    /// Status updates for the operator. Can be taken once.
    pub fn take_statuses(&mut self) -> Option<mpsc::UnboundedReceiver<Status>> {
        self.status_rx.take()
    }

    /// Process events until `shutdown` fires, then hang up.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.events_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let input = match event {
                Event::Input(input) => input,
                Event::Channel { generation, input } => {
                    if generation != self.generation {
                        debug!(generation, ?input, "Dropping event from an old connection");
                        continue;
                    }
                    if matches!(
                        input,
                        ClientInput::ChannelClosed | ClientInput::ChannelFailed { .. }
                    ) {
                        self.channel = None;
                    }
                    input
                }
            };
            self.dispatch(input);
        }

        info!("Client shutting down");
        self.dispatch(ClientInput::Hangup);
    }

    fn dispatch(&mut self, input: ClientInput) {
        match &input {
            ClientInput::CaptureDone { cycle, .. } | ClientInput::CaptureFailed { cycle, .. } => {
                // Also releases the capture timer.
                if let Some(stop) = self.captures.remove(cycle) {
                    stop.cancel();
                }
            }
            ClientInput::PlaybackEnded { id, .. } => {
                self.playbacks.remove(id);
            }
            _ => {}
        }
        for effect in self.core.handle(input) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: ClientEffect) {
        match effect {
            ClientEffect::Connect => self.connect(),
            ClientEffect::CloseChannel => {
                self.generation += 1;
                if let Some(channel) = self.channel.take() {
                    channel.cancel.cancel();
                }
            }
            ClientEffect::SendTranscript(text) => {
                let sent = self
                    .channel
                    .as_ref()
                    .is_some_and(|channel| channel.outbound.send(text).is_ok());
                if !sent {
                    warn!("No open channel, transcript dropped");
                }
            }
            ClientEffect::OpenCapture { cycle } => {
                let stop = CancellationToken::new();
                self.captures.insert(cycle, stop.clone());
                let capture = self.capture.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let input = match capture.record(stop).await {
                        Ok(audio) => ClientInput::CaptureDone { cycle, audio },
                        Err(e) => ClientInput::CaptureFailed {
                            cycle,
                            error: e.to_string(),
                        },
                    };
                    let _ = events.send(Event::Input(input));
                });
            }
            ClientEffect::StopCapture { cycle } => {
                if let Some(stop) = self.captures.get(&cycle) {
                    stop.cancel();
                }
            }
            ClientEffect::ArmCaptureTimeout { cycle, after } => {
                let Some(stop) = self.captures.get(&cycle).cloned() else {
                    return;
                };
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = stop.cancelled() => {}
                        _ = tokio::time::sleep(after) => {
                            let _ = events.send(Event::Input(ClientInput::CaptureTimeout { cycle }));
                        }
                    }
                });
            }
            ClientEffect::Transcribe { cycle, audio } => {
                let stt = self.stt.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = stt.transcribe(&audio).await.map_err(|e| e.to_string());
                    let _ = events.send(Event::Input(ClientInput::Transcribed { cycle, result }));
                });
            }
            ClientEffect::Play {
                id,
                audio_ref,
                looped,
            } => self.play(id, &audio_ref, looped),
            ClientEffect::StopPlayback(id) => {
                if let Some(stop) = self.playbacks.remove(&id) {
                    stop.cancel();
                }
            }
            ClientEffect::Status(status) => {
                info!(%status, "Status");
                let _ = self.status_tx.send(status);
            }
        }
    }

    fn connect(&mut self) {
        if let Some(previous) = self.channel.take() {
            previous.cancel.cancel();
        }
        self.generation += 1;
        let generation = self.generation;
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let cancel = CancellationToken::new();
        self.channel = Some(Channel {
            outbound,
            cancel: cancel.clone(),
        });

        let url = self.server_url.clone();
        let timeout = self.connect_timeout;
        let events = self.events_tx.clone();
        let emit = move |input: ClientInput| {
            let _ = events.send(Event::Channel { generation, input });
        };

        tokio::spawn(async move {
            info!(%url, "Connecting");
            let attempt = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str()));
            let stream = tokio::select! {
                _ = cancel.cancelled() => return,
                result = attempt => match result {
                    Ok(Ok((stream, _))) => stream,
                    Ok(Err(e)) => {
                        emit(ClientInput::ChannelFailed { error: e.to_string() });
                        return;
                    }
                    Err(_) => {
                        emit(ClientInput::ChannelFailed { error: "connection timed out".into() });
                        return;
                    }
                },
            };
            emit(ClientInput::ChannelOpened);

            let (mut sink, mut source) = stream.split();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(text) = outbound_rx.recv() => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            emit(ClientInput::ChannelFailed { error: e.to_string() });
                            break;
                        }
                    }
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => match ServerMessage::decode(text.as_str()) {
                            Ok(message) => emit(ClientInput::Server(message)),
                            Err(e) => warn!(error = %e, "Ignoring undecodable server message"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            emit(ClientInput::ChannelClosed);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            emit(ClientInput::ChannelFailed { error: e.to_string() });
                            break;
                        }
                    },
                }
            }
            debug!("Channel task finished");
        });
    }

    fn play(&mut self, id: PlaybackId, audio_ref: &str, looped: bool) {
        let stop = CancellationToken::new();
        self.playbacks.insert(id, stop.clone());
        let url = resolve_audio_url(&self.http_origin, audio_ref);
        let http = self.http.clone();
        let player = self.player.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            debug!(playback = %id, %url, looped, "Playing");
            let result: Result<()> = async {
                let response = http
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| CallbookError::Other(e.into()))?;
                let audio = response
                    .bytes()
                    .await
                    .map_err(|e| CallbookError::Other(e.into()))?;
                if stop.is_cancelled() {
                    return Ok(());
                }
                player.play(audio.to_vec(), looped, stop).await
            }
            .await;
            let _ = events.send(Event::Input(ClientInput::PlaybackEnded {
                id,
                error: result.err().map(|e| e.to_string()),
            }));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_origin_from_ws_url() {
        assert_eq!(http_origin("ws://localhost:3000/ws").unwrap(), "http://localhost:3000");
        assert_eq!(http_origin("wss://calls.example.com/ws").unwrap(), "https://calls.example.com");
        assert!(matches!(http_origin("ftp://x/ws"), Err(CallbookError::Config(_))));
        assert!(http_origin("not a url").is_err());
    }

    #[test]
    fn test_resolve_audio_url() {
        assert_eq!(
            resolve_audio_url("http://localhost:3000", "/audio/hold"),
            "http://localhost:3000/audio/hold"
        );
        assert_eq!(
            resolve_audio_url("http://localhost:3000", "https://cdn.example.com/a.mp3"),
            "https://cdn.example.com/a.mp3"
        );
    }
}
