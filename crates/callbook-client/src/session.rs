//! Client-side conversation state shared by the controllers.

use std::fmt;

use crate::machine::ClientEffect;

/// Operator-facing status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Connected,
    Disconnected,
    ChannelError,
    Listening,
    YouSaid(String),
    RecognitionFailed,
    CaptureFailed,
    Thinking,
    PleaseHold,
    ReplyPlaying,
    EndedNaturally,
    SessionEnded,
    ManuallyEnded,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("Connected to server"),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::ChannelError => f.write_str("Connection error"),
            Self::Listening => f.write_str("Listening..."),
            Self::YouSaid(text) => write!(f, "You said: {text}"),
            Self::RecognitionFailed => f.write_str("Speech recognition failed."),
            Self::CaptureFailed => f.write_str("Microphone unavailable."),
            Self::Thinking => f.write_str("AI is thinking..."),
            Self::PleaseHold => f.write_str("Please hold, AI is preparing your response..."),
            Self::ReplyPlaying => f.write_str("Reply is playing..."),
            Self::EndedNaturally => f.write_str("Conversation ended naturally."),
            Self::SessionEnded => f.write_str("Session ended."),
            Self::ManuallyEnded => f.write_str("Conversation manually ended."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// Identifies one playback so late completions can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ClientSession {
    pub conversation_active: bool,
    pub channel: ChannelState,
    pub status: Option<Status>,
    /// Begin capturing once the channel opens.
    pub pending_start: bool,
    pub(crate) next_cycle: u64,
    pub(crate) next_playback: u64,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self {
            conversation_active: true,
            channel: ChannelState::Closed,
            status: None,
            pending_start: false,
            next_cycle: 0,
            next_playback: 0,
        }
    }
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_cycle(&mut self) -> u64 {
        self.next_cycle += 1;
        self.next_cycle
    }

    pub fn next_playback(&mut self) -> PlaybackId {
        self.next_playback += 1;
        PlaybackId(self.next_playback)
    }

    pub fn set_status(&mut self, status: Status, effects: &mut Vec<ClientEffect>) {
        if self.status.as_ref() == Some(&status) {
            return;
        }
        self.status = Some(status.clone());
        effects.push(ClientEffect::Status(status));
    }

    pub fn is_open(&self) -> bool {
        self.channel == ChannelState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increase() {
        let mut session = ClientSession::new();
        assert_eq!(session.next_cycle(), 1);
        assert_eq!(session.next_cycle(), 2);
        assert_eq!(session.next_playback(), PlaybackId(1));
    }

    #[test]
    fn test_repeated_status_not_reemitted() {
        let mut session = ClientSession::new();
        let mut effects = Vec::new();
        session.set_status(Status::Listening, &mut effects);
        session.set_status(Status::Listening, &mut effects);
        session.set_status(Status::YouSaid("hi".into()), &mut effects);
        assert_eq!(
            effects,
            vec![
                ClientEffect::Status(Status::Listening),
                ClientEffect::Status(Status::YouSaid("hi".into()))
            ]
        );
    }

    #[test]
    fn test_status_text() {
        assert_eq!(Status::YouSaid("My name is Sam".into()).to_string(), "You said: My name is Sam");
        assert_eq!(Status::ManuallyEnded.to_string(), "Conversation manually ended.");
    }
}
