//! Audio signal protocol exchanged over the conversation WebSocket.
//!
//! The client sends raw transcript text frames. The server answers with two
//! JSON message shapes only:
//!
//! - `{"audioRef": "/audio/...", "class": "filler" | "hold" | "reply", "loop": bool}`
//! - `{"stopBackground": true}`
//!
//! Messages are not acknowledged; channel order is the only ordering guarantee.

use serde::{Deserialize, Serialize};

use crate::error::{CallbookError, Result};

/// Path under which the shared hold asset is served.
pub const HOLD_AUDIO_REF: &str = "/audio/hold";

/// Semantic class of a reply-audio clip, decoded once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioClass {
    /// Short placeholder speech while a turn is processed.
    Filler,
    /// Looped background audio, stopped explicitly by `StopBackground`.
    Hold,
    /// The turn's primary spoken reply.
    Reply,
}

/// Server -> client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    ReplyAudio {
        audio_ref: String,
        class: AudioClass,
        looped: bool,
    },
    StopBackground,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireMessage {
    ReplyAudio {
        #[serde(rename = "audioRef")]
        audio_ref: String,
        class: AudioClass,
        #[serde(rename = "loop", default)]
        looped: bool,
    },
    StopBackground {
        #[serde(rename = "stopBackground")]
        stop_background: bool,
    },
}

impl ServerMessage {
    pub fn filler(audio_ref: impl Into<String>) -> Self {
        Self::ReplyAudio {
            audio_ref: audio_ref.into(),
            class: AudioClass::Filler,
            looped: false,
        }
    }

    pub fn hold(audio_ref: impl Into<String>) -> Self {
        Self::ReplyAudio {
            audio_ref: audio_ref.into(),
            class: AudioClass::Hold,
            looped: true,
        }
    }

    pub fn reply(audio_ref: impl Into<String>) -> Self {
        Self::ReplyAudio {
            audio_ref: audio_ref.into(),
            class: AudioClass::Reply,
            looped: false,
        }
    }

    /// The audio class carried by a reply-audio message.
    pub fn class(&self) -> Option<AudioClass> {
        match self {
            Self::ReplyAudio { class, .. } => Some(*class),
            Self::StopBackground => None,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let wire = match self {
            Self::ReplyAudio {
                audio_ref,
                class,
                looped,
            } => WireMessage::ReplyAudio {
                audio_ref: audio_ref.clone(),
                class: *class,
                looped: *looped,
            },
            Self::StopBackground => WireMessage::StopBackground {
                stop_background: true,
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let wire: WireMessage = serde_json::from_str(text)
            .map_err(|e| CallbookError::Parse(format!("invalid server message: {e}")))?;
        match wire {
            WireMessage::ReplyAudio {
                audio_ref,
                class,
                looped,
            } => Ok(Self::ReplyAudio {
                audio_ref,
                class,
                looped,
            }),
            WireMessage::StopBackground {
                stop_background: true,
            } => Ok(Self::StopBackground),
            WireMessage::StopBackground { .. } => Err(CallbookError::Parse(
                "stopBackground must be true".into(),
            )),
        }
    }
}
