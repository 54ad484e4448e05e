//! Lark Base adapter over the bitable v1 Open API.
//!
//! The REST API addresses record cells by field *name*, while the rest of the
//! crate speaks field *ids*; each table keeps the id → name map it loaded at
//! lookup and translates in both directions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{HostBase, HostError, HostTable};
use crate::models::host::{FieldMeta, RecordFields, RecordId};
use crate::models::null_as_default;

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Page<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableItem {
    table_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FieldItem {
    field_id: String,
    field_name: String,
}

#[derive(Debug, Deserialize)]
struct RecordItem {
    record_id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    record: RecordItem,
}

struct LarkInner {
    client: Client,
    api_url: String,
    app_token: String,
    access_token: String,
}

impl LarkInner {
    fn app_url(&self, tail: &str) -> String {
        format!(
            "{}/open-apis/bitable/v1/apps/{}/{}",
            self.api_url.trim_end_matches('/'),
            self.app_token,
            tail
        )
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, HostError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, HostError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    /// Follows `page_token` until `has_more` is false.
    async fn get_all<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, HostError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("page_size", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }
            let page: Page<T> = self.get(url, &query).await?;
            items.extend(page.items);
            match page.page_token {
                Some(token) if page.has_more => page_token = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HostError> {
    let status = response.status();
    let body = response.text().await?;
    let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
        HostError::Malformed(format!("status {status}: {e}: {body}"))
    })?;
    if envelope.code != 0 {
        return Err(HostError::Api {
            code: envelope.code,
            message: envelope.msg,
        });
    }
    envelope
        .data
        .ok_or_else(|| HostError::Malformed("response has no data".to_string()))
}

/// A Lark Base app, addressed by its app token.
#[derive(Clone)]
pub struct LarkBase {
    inner: Arc<LarkInner>,
}

impl LarkBase {
    pub fn new(
        api_url: &str,
        app_token: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, HostError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner: Arc::new(LarkInner {
                client,
                api_url: api_url.to_string(),
                app_token: app_token.to_string(),
                access_token: access_token.to_string(),
            }),
        })
    }
}

#[async_trait]
impl HostBase for LarkBase {
    async fn table_by_name(&self, name: &str) -> Result<Option<Arc<dyn HostTable>>, HostError> {
        let tables: Vec<TableItem> = self.inner.get_all(&self.inner.app_url("tables")).await?;
        debug!("Lark base lists {} tables", tables.len());

        let Some(table) = tables.into_iter().find(|t| t.name == name) else {
            return Ok(None);
        };

        let fields: Vec<FieldItem> = self
            .inner
            .get_all(&self.inner.app_url(&format!("tables/{}/fields", table.table_id)))
            .await?;
        info!(
            "Resolved Lark table '{}' ({}) with {} fields",
            table.name,
            table.table_id,
            fields.len()
        );

        Ok(Some(Arc::new(LarkTable {
            inner: self.inner.clone(),
            table_id: table.table_id,
            name: table.name,
            fields: fields
                .into_iter()
                .map(|f| FieldMeta {
                    id: f.field_id,
                    name: f.field_name,
                })
                .collect(),
            rows: Mutex::new(HashMap::new()),
        })))
    }
}

pub struct LarkTable {
    inner: Arc<LarkInner>,
    table_id: String,
    name: String,
    fields: Vec<FieldMeta>,
    /// Row cells keyed by field name, filled by `record_ids`.
    rows: Mutex<HashMap<RecordId, Map<String, Value>>>,
}

impl LarkTable {
    fn records_url(&self) -> String {
        self.inner
            .app_url(&format!("tables/{}/records", self.table_id))
    }

    fn field_name(&self, field_id: &str) -> Result<&str, HostError> {
        self.fields
            .iter()
            .find(|f| f.id == field_id)
            .map(|f| f.name.as_str())
            .ok_or_else(|| HostError::FieldNotBound(field_id.to_string()))
    }

    fn cached_cell(&self, record_id: &str, field_name: &str) -> Option<Value> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.get(record_id)
            .map(|cells| cells.get(field_name).cloned().unwrap_or(Value::Null))
    }

    /// Reads one record from the API and refreshes its cached row.
    async fn fetch_record(&self, record_id: &str, field_name: &str) -> Result<Value, HostError> {
        let url = format!("{}/{}", self.records_url(), record_id);
        let data: RecordEnvelope = self.inner.get(&url, &[]).await?;
        let value = data
            .record
            .fields
            .get(field_name)
            .cloned()
            .unwrap_or(Value::Null);

        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cells) = rows.get_mut(record_id) {
            *cells = data.record.fields;
        }
        Ok(value)
    }
}

#[async_trait]
impl HostTable for LarkTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn field_meta_list(&self) -> Result<Vec<FieldMeta>, HostError> {
        Ok(self.fields.clone())
    }

    async fn record_ids(&self) -> Result<Vec<RecordId>, HostError> {
        let records: Vec<RecordItem> = self.inner.get_all(&self.records_url()).await?;
        let ids = records.iter().map(|r| r.record_id.clone()).collect();

        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.clear();
        rows.extend(records.into_iter().map(|r| (r.record_id, r.fields)));
        Ok(ids)
    }

    async fn cell_value(&self, record_id: &str, field_id: &str) -> Result<Value, HostError> {
        let field_name = self.field_name(field_id)?;
        if let Some(value) = self.cached_cell(record_id, field_name) {
            return Ok(value);
        }
        self.fetch_record(record_id, field_name).await
    }

    async fn fresh_cell_value(&self, record_id: &str, field_id: &str) -> Result<Value, HostError> {
        let field_name = self.field_name(field_id)?;
        self.fetch_record(record_id, field_name).await
    }

    async fn add_record(&self, fields: RecordFields) -> Result<RecordId, HostError> {
        let mut named = Map::new();
        for (field_id, value) in fields {
            named.insert(self.field_name(&field_id)?.to_string(), value);
        }
        let data: RecordEnvelope = self
            .inner
            .post(&self.records_url(), &json!({ "fields": named }))
            .await?;
        Ok(data.record.record_id)
    }
}
