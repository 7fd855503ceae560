//! WebSocket gateway for voice booking conversations.
//!
//! The gateway accepts one WebSocket per conversation, keeps the booking
//! session for it, runs the turn pipeline for every transcript it receives,
//! and serves the synthesized clips the pipeline announces.

pub mod audio_store;
pub mod connection;
pub mod extraction;
pub mod hold;
pub mod pipeline;
pub mod server;
pub mod state;

pub use pipeline::{Collaborators, TurnOutcome, TurnPipeline};
pub use server::{router, serve, start_gateway};
pub use state::GatewayState;
