//! The client state machine.
//!
//! All client decisions are made here, synchronously. IO completions come in
//! as [`ClientInput`]s and the IO to perform goes out as [`ClientEffect`]s.

use std::time::Duration;

use tracing::{debug, info};

use callbook_core::config::Config;
use callbook_core::protocol::ServerMessage;

use crate::playback::PlaybackController;
use crate::recording::RecordingController;
use crate::session::{ChannelState, ClientSession, PlaybackId, Status};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput {
    /// Operator starts (or restarts) the conversation.
    Start,
    /// Operator ends the current capture early.
    Stop,
    /// Operator hangs up.
    Hangup,
    CaptureTimeout { cycle: u64 },
    CaptureDone { cycle: u64, audio: Vec<u8> },
    CaptureFailed { cycle: u64, error: String },
    Transcribed { cycle: u64, result: Result<String, String> },
    ChannelOpened,
    ChannelFailed { error: String },
    ChannelClosed,
    Server(ServerMessage),
    PlaybackEnded { id: PlaybackId, error: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEffect {
    Connect,
    CloseChannel,
    SendTranscript(String),
    OpenCapture { cycle: u64 },
    StopCapture { cycle: u64 },
    ArmCaptureTimeout { cycle: u64, after: Duration },
    Transcribe { cycle: u64, audio: Vec<u8> },
    Play { id: PlaybackId, audio_ref: String, looped: bool },
    StopPlayback(PlaybackId),
    Status(Status),
}

#[derive(Debug, Clone)]
pub struct ClientCore {
    session: ClientSession,
    recording: RecordingController,
    playback: PlaybackController,
}

impl ClientCore {
    pub fn new(capture_timeout: Duration, goodbye_phrases: Vec<String>) -> Self {
        Self {
            session: ClientSession::new(),
            recording: RecordingController::new(capture_timeout, goodbye_phrases),
            playback: PlaybackController::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.client().capture_timeout_ms),
            config.conversation().goodbye_phrases,
        )
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn recording(&self) -> &RecordingController {
        &self.recording
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn handle(&mut self, input: ClientInput) -> Vec<ClientEffect> {
        let mut effects = Vec::new();
        let fx = &mut effects;
        let session = &mut self.session;

        match input {
            ClientInput::Start => {
                session.conversation_active = true;
                self.recording.start(session, fx);
            }
            ClientInput::Stop => self.recording.stop(fx),
            ClientInput::Hangup => self.hangup(fx),
            ClientInput::CaptureTimeout { cycle } => self.recording.timeout(cycle, fx),
            ClientInput::CaptureDone { cycle, audio } => {
                self.recording.capture_done(cycle, audio, fx);
            }
            ClientInput::CaptureFailed { cycle, error } => {
                self.recording.capture_failed(cycle, &error, session, fx);
            }
            ClientInput::Transcribed { cycle, result } => {
                self.recording.transcribed(cycle, result, session, fx);
            }
            ClientInput::ChannelOpened => match session.channel {
                ChannelState::Connecting => {
                    info!("Channel open");
                    session.channel = ChannelState::Open;
                    session.set_status(Status::Connected, fx);
                    if std::mem::take(&mut session.pending_start) {
                        self.recording.start(session, fx);
                    }
                }
                // Opened after a hangup: not wanted any more.
                ChannelState::Closed => fx.push(ClientEffect::CloseChannel),
                ChannelState::Open => {}
            },
            ClientInput::ChannelFailed { error } => {
                if session.channel != ChannelState::Closed {
                    info!(%error, "Channel failed");
                    session.channel = ChannelState::Closed;
                    session.pending_start = false;
                    session.set_status(Status::ChannelError, fx);
                }
            }
            ClientInput::ChannelClosed => {
                if session.channel != ChannelState::Closed {
                    info!("Channel closed by server");
                    session.channel = ChannelState::Closed;
                    session.pending_start = false;
                    session.set_status(Status::Disconnected, fx);
                }
            }
            ClientInput::Server(message) => {
                if session.is_open() {
                    self.playback.on_message(message, session, fx);
                } else {
                    debug!(?message, "Ignoring server message while channel is closed");
                }
            }
            ClientInput::PlaybackEnded { id, error } => {
                self.playback
                    .on_ended(id, error.as_deref(), session, &mut self.recording, fx);
            }
        }

        effects
    }

    fn hangup(&mut self, fx: &mut Vec<ClientEffect>) {
        let session = &mut self.session;
        session.conversation_active = false;
        session.pending_start = false;
        self.recording.hangup(fx);
        self.playback.hangup(fx);
        if session.channel != ChannelState::Closed {
            fx.push(ClientEffect::CloseChannel);
            session.channel = ChannelState::Closed;
        }
        session.set_status(Status::ManuallyEnded, fx);
    }
}

#[cfg(test)]
mod tests {
    use callbook_core::config::ConversationConfig;

    use super::*;
    use crate::recording::RecordingState;

    fn core() -> ClientCore {
        ClientCore::new(
            Duration::from_secs(15),
            ConversationConfig::default().goodbye_phrases,
        )
    }

    /// Start and open the channel; capture cycle 1 is running.
    fn connected() -> ClientCore {
        let mut core = core();
        assert_eq!(core.handle(ClientInput::Start), vec![ClientEffect::Connect]);
        let fx = core.handle(ClientInput::ChannelOpened);
        assert!(fx.contains(&ClientEffect::OpenCapture { cycle: 1 }));
        core
    }

    fn send_turn(core: &mut ClientCore, text: &str) -> Vec<ClientEffect> {
        let RecordingState::Capturing { cycle } = core.recording().state() else {
            panic!("not capturing: {:?}", core.recording().state());
        };
        let mut fx = core.handle(ClientInput::Stop);
        fx.extend(core.handle(ClientInput::CaptureDone {
            cycle,
            audio: vec![0; 4],
        }));
        fx.extend(core.handle(ClientInput::Transcribed {
            cycle,
            result: Ok(text.into()),
        }));
        fx
    }

    fn play_id(fx: &[ClientEffect]) -> PlaybackId {
        fx.iter()
            .find_map(|e| match e {
                ClientEffect::Play { id, .. } => Some(*id),
                _ => None,
            })
            .expect("no play effect")
    }

    fn assert_hung_up(core: &ClientCore, fx: &[ClientEffect]) {
        assert!(!core.session().conversation_active);
        assert_eq!(core.session().channel, ChannelState::Closed);
        assert_eq!(core.recording().state(), RecordingState::Idle);
        assert!(core.playback().is_idle());
        assert_eq!(core.session().status, Some(Status::ManuallyEnded));
        assert!(!fx.iter().any(|e| matches!(
            e,
            ClientEffect::OpenCapture { .. } | ClientEffect::Play { .. } | ClientEffect::Connect
        )));
    }

    #[test]
    fn test_thats_all_thank_you_scenario() {
        let mut core = connected();
        let fx = send_turn(&mut core, "That's all, thank you");
        assert!(fx.contains(&ClientEffect::SendTranscript("That's all, thank you".into())));
        assert!(!core.session().conversation_active);

        let fx = core.handle(ClientInput::Server(ServerMessage::reply("/audio/s/r")));
        let id = play_id(&fx);
        let fx = core.handle(ClientInput::PlaybackEnded { id, error: None });

        assert!(!fx.iter().any(|e| matches!(e, ClientEffect::OpenCapture { .. })));
        assert_eq!(core.recording().state(), RecordingState::Idle);
        assert_eq!(core.session().status, Some(Status::SessionEnded));
    }

    #[test]
    fn test_reply_end_starts_next_cycle() {
        let mut core = connected();
        send_turn(&mut core, "My name is Sam");
        core.handle(ClientInput::Server(ServerMessage::filler("/audio/s/f")));
        core.handle(ClientInput::Server(ServerMessage::StopBackground));
        let id = play_id(&core.handle(ClientInput::Server(ServerMessage::reply("/audio/s/r"))));

        let fx = core.handle(ClientInput::PlaybackEnded { id, error: None });
        assert!(fx.contains(&ClientEffect::OpenCapture { cycle: 2 }));
    }

    #[test]
    fn test_failed_reply_playback_still_continues() {
        let mut core = connected();
        send_turn(&mut core, "My name is Sam");
        let id = play_id(&core.handle(ClientInput::Server(ServerMessage::reply("/audio/s/r"))));
        let fx = core.handle(ClientInput::PlaybackEnded {
            id,
            error: Some("404".into()),
        });
        assert!(fx.contains(&ClientEffect::OpenCapture { cycle: 2 }));
    }

    #[test]
    fn test_empty_transcript_is_not_sent() {
        let mut core = connected();
        let fx = send_turn(&mut core, "   ");
        assert!(!fx.iter().any(|e| matches!(e, ClientEffect::SendTranscript(_))));
        assert!(fx.contains(&ClientEffect::OpenCapture { cycle: 2 }));
    }

    #[test]
    fn test_hangup_while_idle_and_closed() {
        let mut core = core();
        let fx = core.handle(ClientInput::Hangup);
        assert!(!fx.contains(&ClientEffect::CloseChannel));
        assert_hung_up(&core, &fx);
    }

    #[test]
    fn test_hangup_while_connecting() {
        let mut core = core();
        core.handle(ClientInput::Start);
        let fx = core.handle(ClientInput::Hangup);
        assert!(fx.contains(&ClientEffect::CloseChannel));
        assert_hung_up(&core, &fx);

        // The connection completing afterwards is closed again, capture never starts.
        let fx = core.handle(ClientInput::ChannelOpened);
        assert_eq!(fx, vec![ClientEffect::CloseChannel]);
        assert_eq!(core.recording().state(), RecordingState::Idle);
    }

    #[test]
    fn test_hangup_while_capturing() {
        let mut core = connected();
        let fx = core.handle(ClientInput::Hangup);
        assert!(fx.contains(&ClientEffect::StopCapture { cycle: 1 }));
        assert!(fx.contains(&ClientEffect::CloseChannel));
        assert_hung_up(&core, &fx);

        // Late device and recognizer results are dropped.
        let mut late = core.handle(ClientInput::CaptureDone {
            cycle: 1,
            audio: vec![1],
        });
        late.extend(core.handle(ClientInput::Transcribed {
            cycle: 1,
            result: Ok("My name is Sam".into()),
        }));
        assert!(late.is_empty());
    }

    #[test]
    fn test_hangup_while_transcribing() {
        let mut core = connected();
        core.handle(ClientInput::Stop);
        core.handle(ClientInput::CaptureDone {
            cycle: 1,
            audio: vec![1],
        });
        let fx = core.handle(ClientInput::Hangup);
        assert_hung_up(&core, &fx);

        let late = core.handle(ClientInput::Transcribed {
            cycle: 1,
            result: Ok("My name is Sam".into()),
        });
        assert!(late.is_empty());
    }

    #[test]
    fn test_hangup_while_playing_filler_hold_and_reply() {
        for class in ["filler", "hold", "reply", "filler+hold"] {
            let mut core = connected();
            send_turn(&mut core, "My name is Sam");
            let mut expected_stops = Vec::new();
            if class.contains("filler") {
                let fx = core.handle(ClientInput::Server(ServerMessage::filler("/audio/s/f")));
                expected_stops.push(play_id(&fx));
            }
            if class.contains("hold") {
                let fx = core.handle(ClientInput::Server(ServerMessage::hold("/audio/hold")));
                expected_stops.push(play_id(&fx));
            }
            if class == "reply" {
                let fx = core.handle(ClientInput::Server(ServerMessage::reply("/audio/s/r")));
                expected_stops.push(play_id(&fx));
            }

            let fx = core.handle(ClientInput::Hangup);
            for id in &expected_stops {
                assert!(fx.contains(&ClientEffect::StopPlayback(*id)), "{class}: {fx:?}");
            }
            assert_hung_up(&core, &fx);

            // Completion of a stopped clip does not restart anything.
            let late = core.handle(ClientInput::PlaybackEnded {
                id: expected_stops[0],
                error: None,
            });
            assert!(late.is_empty(), "{class}: {late:?}");
        }
    }

    #[test]
    fn test_server_messages_ignored_after_hangup() {
        let mut core = connected();
        core.handle(ClientInput::Hangup);
        let fx = core.handle(ClientInput::Server(ServerMessage::reply("/audio/s/r")));
        assert!(fx.is_empty());
        assert!(core.playback().is_idle());
    }

    #[test]
    fn test_restart_after_hangup_reconnects() {
        let mut core = connected();
        core.handle(ClientInput::Hangup);

        let fx = core.handle(ClientInput::Start);
        assert_eq!(fx, vec![ClientEffect::Connect]);
        assert!(core.session().conversation_active);

        let fx = core.handle(ClientInput::ChannelOpened);
        assert!(fx.contains(&ClientEffect::Status(Status::Connected)));
        assert!(fx.contains(&ClientEffect::OpenCapture { cycle: 2 }));
    }

    #[test]
    fn test_connect_failure_reports_channel_error() {
        let mut core = core();
        core.handle(ClientInput::Start);
        let fx = core.handle(ClientInput::ChannelFailed {
            error: "connection refused".into(),
        });
        assert_eq!(fx, vec![ClientEffect::Status(Status::ChannelError)]);
        assert!(!core.session().pending_start);

        // The operator can try again.
        assert_eq!(core.handle(ClientInput::Start), vec![ClientEffect::Connect]);
    }
}
