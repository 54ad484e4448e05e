//! Host table access. The spreadsheet host is reached only through the
//! `HostBase`/`HostTable` traits so the reconciler and workflows can run against
//! an in-memory table in tests and in local development.

pub mod binding;
pub mod lark;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::host::{FieldMeta, RecordFields, RecordId};

pub use binding::{FieldMap, HostBinding};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Table '{0}' not found in host base")]
    TableNotFound(String),

    #[error("Record {0} not found")]
    RecordNotFound(String),

    #[error("Field '{0}' is not bound in this table")]
    FieldNotBound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Host API error (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("Malformed host response: {0}")]
    Malformed(String),
}

/// A single table in the host base.
#[async_trait]
pub trait HostTable: Send + Sync {
    fn name(&self) -> &str;

    async fn field_meta_list(&self) -> Result<Vec<FieldMeta>, HostError>;

    async fn record_ids(&self) -> Result<Vec<RecordId>, HostError>;

    async fn cell_value(&self, record_id: &str, field_id: &str) -> Result<Value, HostError>;

    /// Like `cell_value`, but never answers from a listing cache.
    async fn fresh_cell_value(&self, record_id: &str, field_id: &str) -> Result<Value, HostError> {
        self.cell_value(record_id, field_id).await
    }

    /// Appends a row and returns its new record id.
    async fn add_record(&self, fields: RecordFields) -> Result<RecordId, HostError>;
}

/// The host base (workbook) that owns the tables.
#[async_trait]
pub trait HostBase: Send + Sync {
    async fn table_by_name(&self, name: &str) -> Result<Option<Arc<dyn HostTable>>, HostError>;
}
