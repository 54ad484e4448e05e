//! In-process host base. Backs `HOST_BACKEND=memory` and the test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{HostBase, HostError, HostTable};
use crate::models::host::{FieldMeta, RecordFields, RecordId};

/// Column names of the recruitment request table the panel was built against.
const RECRUITMENT_FIELDS: [&str; 13] = [
    "Position",
    "Job Description",
    "City",
    "Department",
    "Recruitment Type",
    "Job Duties",
    "Required Qualifications",
    "Salary and Benefits",
    "Expected Start Date",
    "HR Name",
    "Status",
    "Requester",
    "③Recruitment Progress Management",
];

#[derive(Default)]
pub struct InMemoryBase {
    tables: HashMap<String, Arc<InMemoryTable>>,
}

impl InMemoryBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<Arc<InMemoryTable>>) -> Self {
        let table = table.into();
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// A base holding one empty table with the recruitment request schema.
    pub fn with_recruitment_table(name: &str) -> Self {
        let fields = RECRUITMENT_FIELDS
            .iter()
            .enumerate()
            .map(|(i, field)| FieldMeta {
                id: format!("fld{:03}", i + 1),
                name: (*field).to_string(),
            })
            .collect();
        Self::new().with_table(InMemoryTable::new(name, fields))
    }
}

#[async_trait]
impl HostBase for InMemoryBase {
    async fn table_by_name(&self, name: &str) -> Result<Option<Arc<dyn HostTable>>, HostError> {
        Ok(self
            .tables
            .get(name)
            .map(|t| t.clone() as Arc<dyn HostTable>))
    }
}

pub struct InMemoryTable {
    name: String,
    fields: Vec<FieldMeta>,
    rows: Mutex<Vec<(RecordId, RecordFields)>>,
    next_id: AtomicUsize,
}

impl InMemoryTable {
    pub fn new(name: &str, fields: Vec<FieldMeta>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            rows: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Seeds a row directly, bypassing schema checks.
    #[cfg(test)]
    pub fn insert_row<'a>(&self, cells: impl IntoIterator<Item = (&'a str, Value)>) -> RecordId {
        let record_id = self.allocate_id();
        let fields = cells
            .into_iter()
            .map(|(field, value)| (field.to_string(), value))
            .collect();
        self.lock_rows().push((record_id.clone(), fields));
        record_id
    }

    #[cfg(test)]
    pub fn rows(&self) -> Vec<(RecordId, RecordFields)> {
        self.lock_rows().clone()
    }

    fn allocate_id(&self) -> RecordId {
        format!("rec{:06}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn lock_rows(&self) -> std::sync::MutexGuard<'_, Vec<(RecordId, RecordFields)>> {
        // A poisoned lock only means a test panicked mid-write; the rows are still usable.
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HostTable for InMemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn field_meta_list(&self) -> Result<Vec<FieldMeta>, HostError> {
        Ok(self.fields.clone())
    }

    async fn record_ids(&self) -> Result<Vec<RecordId>, HostError> {
        Ok(self.lock_rows().iter().map(|(id, _)| id.clone()).collect())
    }

    async fn cell_value(&self, record_id: &str, field_id: &str) -> Result<Value, HostError> {
        let rows = self.lock_rows();
        let (_, fields) = rows
            .iter()
            .find(|(id, _)| id == record_id)
            .ok_or_else(|| HostError::RecordNotFound(record_id.to_string()))?;
        Ok(fields.get(field_id).cloned().unwrap_or(Value::Null))
    }

    async fn add_record(&self, fields: RecordFields) -> Result<RecordId, HostError> {
        if let Some(unknown) = fields
            .keys()
            .find(|id| !self.fields.iter().any(|f| &f.id == *id))
        {
            return Err(HostError::FieldNotBound(unknown.clone()));
        }
        let record_id = self.allocate_id();
        self.lock_rows().push((record_id.clone(), fields));
        Ok(record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_recruitment_table_schema() {
        let base = InMemoryBase::with_recruitment_table("Jobs");
        let table = base.table_by_name("Jobs").await.unwrap().unwrap();
        let fields = table.field_meta_list().await.unwrap();
        assert_eq!(fields.len(), RECRUITMENT_FIELDS.len());
        assert_eq!(fields[0].name, "Position");
        assert!(base.table_by_name("Other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_record_rejects_unknown_field() {
        let table = InMemoryTable::new(
            "Jobs",
            vec![FieldMeta {
                id: "f1".to_string(),
                name: "Position".to_string(),
            }],
        );
        let mut fields = RecordFields::new();
        fields.insert("f9".to_string(), json!("x"));
        assert!(matches!(
            table.add_record(fields).await,
            Err(HostError::FieldNotBound(_))
        ));

        let mut fields = RecordFields::new();
        fields.insert("f1".to_string(), json!("Engineer"));
        let id = table.add_record(fields).await.unwrap();
        assert_eq!(table.cell_value(&id, "f1").await.unwrap(), json!("Engineer"));
        assert_eq!(table.cell_value(&id, "f2").await.unwrap(), Value::Null);
    }
}
