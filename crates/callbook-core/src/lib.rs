//! Core types, config, errors, wire protocol, and session model for Callbook.

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod session_store;
