//! Voice client for the booking gateway.
//!
//! [`ClientCore`] is a pure state machine: it takes [`ClientInput`]s and
//! returns [`ClientEffect`]s. [`ClientRuntime`] performs those effects on
//! tokio (WebSocket, microphone, speakers) and feeds the results back in.

pub mod devices;
pub mod machine;
pub mod playback;
pub mod recording;
pub mod runtime;
pub mod session;

pub use devices::{AudioPlayer, CaptureDevice, CommandCapture, CommandPlayer};
pub use machine::{ClientCore, ClientEffect, ClientInput};
pub use runtime::{ClientHandle, ClientRuntime};
pub use session::{ChannelState, ClientSession, PlaybackId, Status};
