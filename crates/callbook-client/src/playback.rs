//! Playback controller: decides which clip is audible.
//!
//! Two handle slots exist. `current` holds the filler or reply clip, `hold`
//! holds looped hold audio. A new clip of either kind replaces the previous
//! clip in the same slot.

use tracing::{debug, warn};

use callbook_core::protocol::{AudioClass, ServerMessage};

use crate::machine::ClientEffect;
use crate::recording::RecordingController;
use crate::session::{ClientSession, PlaybackId, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackHandle {
    pub id: PlaybackId,
    pub class: AudioClass,
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackController {
    current: Option<PlaybackHandle>,
    hold: Option<PlaybackId>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<PlaybackHandle> {
        self.current
    }

    pub fn hold(&self) -> Option<PlaybackId> {
        self.hold
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.hold.is_none()
    }

    pub fn on_message(
        &mut self,
        message: ServerMessage,
        session: &mut ClientSession,
        effects: &mut Vec<ClientEffect>,
    ) {
        match message {
            ServerMessage::StopBackground => {
                if let Some(id) = self.hold.take() {
                    debug!(playback = %id, "Stopping hold audio");
                    effects.push(ClientEffect::StopPlayback(id));
                }
            }
            ServerMessage::ReplyAudio {
                audio_ref,
                class: AudioClass::Hold,
                looped,
            } => {
                if let Some(previous) = self.hold.take() {
                    effects.push(ClientEffect::StopPlayback(previous));
                }
                let id = session.next_playback();
                self.hold = Some(id);
                effects.push(ClientEffect::Play {
                    id,
                    audio_ref,
                    looped,
                });
                session.set_status(Status::PleaseHold, effects);
            }
            ServerMessage::ReplyAudio {
                audio_ref,
                class,
                looped,
            } => {
                if let Some(previous) = self.current.take() {
                    effects.push(ClientEffect::StopPlayback(previous.id));
                }
                let id = session.next_playback();
                self.current = Some(PlaybackHandle { id, class });
                effects.push(ClientEffect::Play {
                    id,
                    audio_ref,
                    looped,
                });
                let status = if class == AudioClass::Reply {
                    Status::ReplyPlaying
                } else {
                    Status::Thinking
                };
                session.set_status(status, effects);
            }
        }
    }

    /// A clip finished (or failed to play). Only the current handle counts.
    pub fn on_ended(
        &mut self,
        id: PlaybackId,
        error: Option<&str>,
        session: &mut ClientSession,
        recording: &mut RecordingController,
        effects: &mut Vec<ClientEffect>,
    ) {
        if let Some(error) = error {
            warn!(playback = %id, %error, "Playback failed");
        }
        if self.hold == Some(id) {
            self.hold = None;
            return;
        }
        let Some(current) = self.current.filter(|h| h.id == id) else {
            debug!(playback = %id, "Ignoring stale playback completion");
            return;
        };
        self.current = None;

        if current.class != AudioClass::Reply {
            return;
        }
        if session.conversation_active {
            recording.start(session, effects);
        } else {
            session.set_status(Status::SessionEnded, effects);
        }
    }

    pub fn hangup(&mut self, effects: &mut Vec<ClientEffect>) {
        if let Some(current) = self.current.take() {
            effects.push(ClientEffect::StopPlayback(current.id));
        }
        if let Some(hold) = self.hold.take() {
            effects.push(ClientEffect::StopPlayback(hold));
        }
    }
}
