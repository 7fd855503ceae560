//! Process-local record store, used in tests and when Airtable is not configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use callbook_core::error::{CallbookError, Result};
use callbook_core::session::RecordId;

use crate::{RecordFields, RecordStore};

/// Every write is also kept in an operation log so callers can inspect ordering.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<RecordId, RecordFields>,
    log: Vec<RecordOp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOp {
    Create(RecordId, RecordFields),
    Update(RecordId, RecordFields),
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &RecordId) -> Option<RecordFields> {
        self.inner.lock().await.records.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn operations(&self) -> Vec<RecordOp> {
        self.inner.lock().await.log.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn id(&self) -> &str {
        "memory"
    }

    async fn create(&self, fields: &RecordFields) -> Result<RecordId> {
        let id = RecordId(format!("rec{}", Uuid::new_v4().simple()));
        let mut inner = self.inner.lock().await;
        inner.records.insert(id.clone(), fields.clone());
        inner.log.push(RecordOp::Create(id.clone(), fields.clone()));
        debug!(record_id = %id, "Created in-memory record");
        Ok(id)
    }

    async fn update(&self, record: &RecordId, fields: &RecordFields) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let existing = inner
            .records
            .get_mut(record)
            .ok_or_else(|| CallbookError::Persistence(format!("unknown record {record}")))?;
        existing.merge(fields);
        inner.log.push(RecordOp::Update(record.clone(), fields.clone()));
        Ok(())
    }
}
