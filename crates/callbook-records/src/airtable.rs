//! Airtable REST adapter.
//!
//! Create: `POST /v0/{base}/{table}` with `{"records":[{"fields":{..}}]}`.
//! Update: `PATCH` to the same URL with `{"records":[{"id":..,"fields":{..}}]}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use callbook_core::config::RecordsConfig;
use callbook_core::error::{CallbookError, Result};
use callbook_core::session::RecordId;

use crate::{RecordFields, RecordStore};

const AIRTABLE_API_URL: &str = "https://api.airtable.com";

pub struct AirtableStore {
    base_url: String,
    api_key: String,
    base_id: String,
    table: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    records: [WriteRecord<'a>; 1],
}

#[derive(Serialize)]
struct WriteRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    fields: &'a RecordFields,
}

#[derive(Deserialize)]
struct WriteResponse {
    #[serde(default)]
    records: Vec<CreatedRecord>,
}

#[derive(Deserialize)]
struct CreatedRecord {
    id: String,
}

impl AirtableStore {
    pub fn new(
        api_key: impl Into<String>,
        base_id: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            base_url: AIRTABLE_API_URL.to_string(),
            api_key: api_key.into(),
            base_id: base_id.into(),
            table: table.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &RecordsConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| CallbookError::Config("No Airtable API key configured".into()))?;
        let base_id = config
            .resolve_base_id()
            .ok_or_else(|| CallbookError::Config("No Airtable base id configured".into()))?;
        Ok(Self::new(api_key, base_id, config.table.clone()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn table_url(&self) -> String {
        // Table names may contain spaces.
        format!(
            "{}/v0/{}/{}",
            self.base_url,
            self.base_id,
            self.table.replace(' ', "%20")
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let resp = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| CallbookError::Persistence(format!("request failed: {e}")))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CallbookError::Persistence(format!(
                "Airtable API error {status}: {body}"
            )));
        }
        Ok(body)
    }
}

fn parse_created_id(body: &str) -> Result<RecordId> {
    let response: WriteResponse = serde_json::from_str(body)
        .map_err(|e| CallbookError::Persistence(format!("malformed Airtable response: {e}")))?;
    response
        .records
        .into_iter()
        .next()
        .map(|r| RecordId(r.id))
        .ok_or_else(|| CallbookError::Persistence("Airtable returned no record".into()))
}

#[async_trait]
impl RecordStore for AirtableStore {
    fn id(&self) -> &str {
        "airtable"
    }

    async fn create(&self, fields: &RecordFields) -> Result<RecordId> {
        let body = WriteRequest {
            records: [WriteRecord { id: None, fields }],
        };
        let text = self
            .send(self.client.post(self.table_url()).json(&body))
            .await?;
        let id = parse_created_id(&text)?;
        debug!(record_id = %id, fields = fields.len(), "Created Airtable record");
        Ok(id)
    }

    async fn update(&self, record: &RecordId, fields: &RecordFields) -> Result<()> {
        let body = WriteRequest {
            records: [WriteRecord {
                id: Some(&record.0),
                fields,
            }],
        };
        self.send(self.client.patch(self.table_url()).json(&body))
            .await?;
        debug!(record_id = %record, fields = fields.len(), "Updated Airtable record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url() {
        let store = AirtableStore::new("k", "appABC", "Booking Log");
        assert_eq!(
            store.table_url(),
            "https://api.airtable.com/v0/appABC/Booking%20Log"
        );
    }

    #[test]
    fn test_request_shapes() {
        let fields = RecordFields::new().with_transcript("hi");
        let create = WriteRequest {
            records: [WriteRecord {
                id: None,
                fields: &fields,
            }],
        };
        assert_eq!(
            serde_json::to_value(&create).unwrap(),
            serde_json::json!({"records": [{"fields": {"User Transcript": "hi"}}]})
        );

        let update = WriteRequest {
            records: [WriteRecord {
                id: Some("rec1"),
                fields: &fields,
            }],
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap()["records"][0]["id"],
            "rec1"
        );
    }

    #[test]
    fn test_parse_created_id() {
        let body = r#"{"records":[{"id":"recXYZ","createdTime":"2025-01-01T00:00:00.000Z","fields":{}}]}"#;
        assert_eq!(parse_created_id(body).unwrap(), RecordId("recXYZ".into()));
        assert!(matches!(
            parse_created_id(r#"{"records":[]}"#),
            Err(CallbookError::Persistence(_))
        ));
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = RecordsConfig {
            api_key: Some("key".into()),
            base_id: None,
            base_id_env: None,
            ..RecordsConfig::default()
        };
        assert!(matches!(
            AirtableStore::from_config(&config),
            Err(CallbookError::Config(_))
        ));
    }
}
