//! Recording controller: `Idle -> Capturing -> Transcribing -> Idle`.
//!
//! Every capture cycle has a number. Device and recognizer results carry it,
//! and anything that does not match the current state is dropped.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::machine::ClientEffect;
use crate::session::{ChannelState, ClientSession, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Capturing { cycle: u64 },
    Transcribing { cycle: u64 },
}

#[derive(Debug, Clone)]
pub struct RecordingController {
    state: RecordingState,
    capture_timeout: Duration,
    goodbye_phrases: Vec<String>,
}

/// Case-insensitive substring match against the goodbye phrases.
pub fn is_goodbye(transcript: &str, phrases: &[String]) -> bool {
    let lowered = transcript.to_lowercase();
    phrases
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| lowered.contains(&p.to_lowercase()))
}

impl RecordingController {
    pub fn new(capture_timeout: Duration, goodbye_phrases: Vec<String>) -> Self {
        Self {
            state: RecordingState::Idle,
            capture_timeout,
            goodbye_phrases,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Begin a capture cycle. Connects first when the channel is closed.
    pub fn start(&mut self, session: &mut ClientSession, effects: &mut Vec<ClientEffect>) {
        if !session.conversation_active || self.state != RecordingState::Idle {
            return;
        }
        match session.channel {
            ChannelState::Open => {}
            ChannelState::Connecting => {
                session.pending_start = true;
                return;
            }
            ChannelState::Closed => {
                session.pending_start = true;
                session.channel = ChannelState::Connecting;
                effects.push(ClientEffect::Connect);
                return;
            }
        }

        let cycle = session.next_cycle();
        self.state = RecordingState::Capturing { cycle };
        debug!(cycle, "Capture started");
        effects.push(ClientEffect::OpenCapture { cycle });
        effects.push(ClientEffect::ArmCaptureTimeout {
            cycle,
            after: self.capture_timeout,
        });
        session.set_status(Status::Listening, effects);
    }

    /// Explicit stop: end the capture and move on to transcription.
    pub fn stop(&mut self, effects: &mut Vec<ClientEffect>) {
        if let RecordingState::Capturing { cycle } = self.state {
            self.finish_capture(cycle, effects);
        }
    }

    pub fn timeout(&mut self, cycle: u64, effects: &mut Vec<ClientEffect>) {
        if self.state == (RecordingState::Capturing { cycle }) {
            debug!(cycle, "Capture window elapsed");
            self.finish_capture(cycle, effects);
        }
    }

    fn finish_capture(&mut self, cycle: u64, effects: &mut Vec<ClientEffect>) {
        self.state = RecordingState::Transcribing { cycle };
        effects.push(ClientEffect::StopCapture { cycle });
    }

    /// Captured audio is ready. The device may also end on its own.
    pub fn capture_done(&mut self, cycle: u64, audio: Vec<u8>, effects: &mut Vec<ClientEffect>) {
        match self.state {
            RecordingState::Capturing { cycle: current } if current == cycle => {
                self.state = RecordingState::Transcribing { cycle };
            }
            RecordingState::Transcribing { cycle: current } if current == cycle => {}
            _ => {
                debug!(cycle, "Discarding stale capture");
                return;
            }
        }
        effects.push(ClientEffect::Transcribe { cycle, audio });
    }

    pub fn capture_failed(
        &mut self,
        cycle: u64,
        error: &str,
        session: &mut ClientSession,
        effects: &mut Vec<ClientEffect>,
    ) {
        if !self.is_current(cycle) {
            return;
        }
        warn!(cycle, %error, "Capture device failed");
        self.state = RecordingState::Idle;
        session.set_status(Status::CaptureFailed, effects);
    }

    pub fn transcribed(
        &mut self,
        cycle: u64,
        result: Result<String, String>,
        session: &mut ClientSession,
        effects: &mut Vec<ClientEffect>,
    ) {
        if self.state != (RecordingState::Transcribing { cycle }) {
            debug!(cycle, "Discarding stale transcription");
            return;
        }
        self.state = RecordingState::Idle;

        let transcript = match result {
            Ok(text) => text.trim().to_string(),
            Err(error) => {
                warn!(cycle, %error, "Speech recognition failed");
                session.set_status(Status::RecognitionFailed, effects);
                return;
            }
        };

        if transcript.is_empty() {
            debug!(cycle, "Nothing recognised, listening again");
            self.start(session, effects);
            return;
        }

        if session.is_open() {
            info!(cycle, %transcript, "Sending transcript");
            effects.push(ClientEffect::SendTranscript(transcript.clone()));
            session.set_status(Status::YouSaid(transcript.clone()), effects);
        } else {
            warn!(cycle, "Channel closed, transcript not sent");
            session.set_status(Status::Disconnected, effects);
        }

        if is_goodbye(&transcript, &self.goodbye_phrases) {
            info!(cycle, "Goodbye detected, conversation will end after the reply");
            session.conversation_active = false;
            session.set_status(Status::EndedNaturally, effects);
        }
    }

    /// Abandon whatever cycle is in flight. Late results become stale.
    pub fn hangup(&mut self, effects: &mut Vec<ClientEffect>) {
        if let RecordingState::Capturing { cycle } = self.state {
            effects.push(ClientEffect::StopCapture { cycle });
        }
        self.state = RecordingState::Idle;
    }

    fn is_current(&self, cycle: u64) -> bool {
        matches!(
            self.state,
            RecordingState::Capturing { cycle: c } | RecordingState::Transcribing { cycle: c } if c == cycle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> Vec<String> {
        callbook_core::config::ConversationConfig::default().goodbye_phrases
    }

    fn open_session() -> ClientSession {
        ClientSession {
            channel: ChannelState::Open,
            ..ClientSession::new()
        }
    }

    fn controller() -> RecordingController {
        RecordingController::new(Duration::from_secs(15), phrases())
    }

    #[test]
    fn test_goodbye_detection() {
        assert!(is_goodbye("That's all, thank you", &phrases()));
        assert!(is_goodbye("OK BYE", &phrases()));
        assert!(is_goodbye("no that’s all", &phrases()));
        assert!(!is_goodbye("My name is Sam", &phrases()));
        assert!(!is_goodbye("anything", &[String::new()]));
    }

    #[test]
    fn test_full_cycle() {
        let mut session = open_session();
        let mut rec = controller();
        let mut fx = Vec::new();

        rec.start(&mut session, &mut fx);
        assert_eq!(rec.state(), RecordingState::Capturing { cycle: 1 });
        assert!(fx.contains(&ClientEffect::OpenCapture { cycle: 1 }));
        assert!(fx.contains(&ClientEffect::ArmCaptureTimeout {
            cycle: 1,
            after: Duration::from_secs(15)
        }));

        fx.clear();
        rec.timeout(1, &mut fx);
        assert_eq!(fx, vec![ClientEffect::StopCapture { cycle: 1 }]);

        fx.clear();
        rec.capture_done(1, b"wav".to_vec(), &mut fx);
        assert_eq!(
            fx,
            vec![ClientEffect::Transcribe {
                cycle: 1,
                audio: b"wav".to_vec()
            }]
        );

        fx.clear();
        rec.transcribed(1, Ok("My name is Sam".into()), &mut session, &mut fx);
        assert_eq!(rec.state(), RecordingState::Idle);
        assert!(fx.contains(&ClientEffect::SendTranscript("My name is Sam".into())));
        assert!(session.conversation_active);
    }

    #[test]
    fn test_goodbye_ends_conversation() {
        let mut session = open_session();
        let mut rec = controller();
        let mut fx = Vec::new();
        rec.start(&mut session, &mut fx);
        rec.stop(&mut fx);
        rec.capture_done(1, vec![1], &mut fx);
        rec.transcribed(1, Ok("That's all, thank you".into()), &mut session, &mut fx);

        assert!(!session.conversation_active);
        assert_eq!(session.status, Some(Status::EndedNaturally));
        assert!(fx.contains(&ClientEffect::SendTranscript("That's all, thank you".into())));

        // No further cycles once inactive.
        fx.clear();
        rec.start(&mut session, &mut fx);
        assert!(fx.is_empty());
    }

    #[test]
    fn test_stale_results_discarded() {
        let mut session = open_session();
        let mut rec = controller();
        let mut fx = Vec::new();
        rec.start(&mut session, &mut fx);
        rec.stop(&mut fx);
        rec.capture_done(1, vec![1], &mut fx);
        rec.transcribed(1, Ok("".into()), &mut session, &mut fx);
        // Empty transcript restarted capture as cycle 2.
        assert_eq!(rec.state(), RecordingState::Capturing { cycle: 2 });

        fx.clear();
        rec.timeout(1, &mut fx);
        rec.capture_done(1, vec![9], &mut fx);
        rec.transcribed(1, Ok("late".into()), &mut session, &mut fx);
        assert!(fx.is_empty());
        assert_eq!(rec.state(), RecordingState::Capturing { cycle: 2 });
    }

    #[test]
    fn test_capture_failure_aborts_cycle_only() {
        let mut session = open_session();
        let mut rec = controller();
        let mut fx = Vec::new();
        rec.start(&mut session, &mut fx);
        rec.capture_failed(1, "permission denied", &mut session, &mut fx);

        assert_eq!(rec.state(), RecordingState::Idle);
        assert_eq!(session.status, Some(Status::CaptureFailed));
        assert!(!fx.iter().any(|e| matches!(e, ClientEffect::SendTranscript(_))));

        fx.clear();
        rec.start(&mut session, &mut fx);
        assert!(fx.contains(&ClientEffect::OpenCapture { cycle: 2 }));
    }

    #[test]
    fn test_recognition_failure_sends_nothing() {
        let mut session = open_session();
        let mut rec = controller();
        let mut fx = Vec::new();
        rec.start(&mut session, &mut fx);
        rec.stop(&mut fx);
        rec.capture_done(1, vec![1], &mut fx);
        fx.clear();
        rec.transcribed(1, Err("401".into()), &mut session, &mut fx);
        assert_eq!(fx, vec![ClientEffect::Status(Status::RecognitionFailed)]);
    }

    #[test]
    fn test_start_while_closed_connects_first() {
        let mut session = ClientSession::new();
        let mut rec = controller();
        let mut fx = Vec::new();
        rec.start(&mut session, &mut fx);

        assert_eq!(fx, vec![ClientEffect::Connect]);
        assert_eq!(session.channel, ChannelState::Connecting);
        assert!(session.pending_start);
        assert_eq!(rec.state(), RecordingState::Idle);
    }
}
