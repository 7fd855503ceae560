//! Booking record persistence.
//!
//! One record per conversation, keyed by the [`RecordId`] the store hands back
//! from [`RecordStore::create`]. Field names match the booking fields plus the
//! transcript and reply columns.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use callbook_core::config::RecordsConfig;
use callbook_core::error::{CallbookError, Result};
use callbook_core::session::{BookingData, BookingField, RecordId};

pub mod airtable;
pub mod memory;

pub use airtable::AirtableStore;
pub use memory::MemoryRecordStore;

/// Column holding the latest user transcript.
pub const TRANSCRIPT_FIELD: &str = "User Transcript";
/// Column holding the latest assistant reply.
pub const REPLY_FIELD: &str = "AI Reply";
/// Placeholder written to [`REPLY_FIELD`] until the reply is generated.
pub const REPLY_PLACEHOLDER: &str = "(waiting...)";

/// A partial record: field name to string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordFields(BTreeMap<String, String>);

impl RecordFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current value of each listed booking field.
    pub fn from_booking(booking: &BookingData, fields: &[BookingField]) -> Self {
        let mut record = Self::new();
        for field in fields {
            record.set(field.as_str(), booking.get(*field));
        }
        record
    }

    pub fn with_transcript(mut self, transcript: &str) -> Self {
        self.set(TRANSCRIPT_FIELD, transcript);
        self
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.set(REPLY_FIELD, reply);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` onto this record.
    pub fn merge(&mut self, other: &RecordFields) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }
}

/// Durable storage for booking records. Failures are `CallbookError::Persistence`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn id(&self) -> &str;

    async fn create(&self, fields: &RecordFields) -> Result<RecordId>;

    async fn update(&self, record: &RecordId, fields: &RecordFields) -> Result<()>;
}

/// Build the configured store. Airtable without credentials falls back to memory.
pub fn from_config(config: &RecordsConfig) -> Result<Arc<dyn RecordStore>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryRecordStore::new())),
        "airtable" => match AirtableStore::from_config(config) {
            Ok(store) => Ok(Arc::new(store)),
            Err(CallbookError::Config(reason)) => {
                warn!(%reason, "Airtable not configured, booking records will be kept in memory only");
                Ok(Arc::new(MemoryRecordStore::new()))
            }
            Err(e) => Err(e),
        },
        other => Err(CallbookError::Config(format!(
            "Unknown records provider: {other}"
        ))),
    }
}
