use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{HostBase, HostError, HostTable};
use crate::models::host::{cell_text, ExistingJobOpening, FieldId, FieldMeta};
use crate::models::job::JobOpening;

/// Logical names the reconciler and workflows look up in the field map.
pub mod fields {
    pub const JOB_POSITION: &str = "jobPosition";
    pub const JOB_DESCRIPTION: &str = "jobDescription";
    pub const JOB_LOCATION: &str = "jobLocation";
    pub const DEPARTMENT: &str = "department";
    pub const JOB_TYPE: &str = "jobType";
    pub const JOB_DUTIES: &str = "jobDuties";
    pub const JOB_QUALIFICATION: &str = "jobQualification";
    pub const JOB_BENEFITS: &str = "jobBenefits";
    pub const EXPECTED_START_DATE: &str = "expectedStartDate";
}

/// Operator, status, link and requester columns are never written.
const EXCLUDED_FIELDS: [&str; 4] = [
    "HR Name",
    "Status",
    "③Recruitment Progress Management",
    "Requester",
];

/// Lower-cased substring → logical name. First match wins.
const FIELD_RULES: [(&str, &str); 9] = [
    ("position", fields::JOB_POSITION),
    ("job description", fields::JOB_DESCRIPTION),
    ("city", fields::JOB_LOCATION),
    ("department", fields::DEPARTMENT),
    ("recruitment type", fields::JOB_TYPE),
    ("job duties", fields::JOB_DUTIES),
    ("required qualifications", fields::JOB_QUALIFICATION),
    ("salary and benefits", fields::JOB_BENEFITS),
    ("expected start date", fields::EXPECTED_START_DATE),
];

/// Logical field name → host field id. Built once per binding, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap(HashMap<String, FieldId>);

impl FieldMap {
    pub fn get(&self, logical: &str) -> Option<&str> {
        self.0.get(logical).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds the map from the table's field metadata.
    /// Unmatched fields are kept under their literal name.
    pub fn from_fields(fields: &[FieldMeta]) -> Self {
        let mut map = HashMap::new();
        for field in fields {
            if EXCLUDED_FIELDS.contains(&field.name.as_str()) {
                debug!("Skipping host field '{}'", field.name);
                continue;
            }
            let lowered = field.name.to_lowercase();
            let logical = FIELD_RULES
                .iter()
                .find(|(needle, _)| lowered.contains(needle))
                .map(|(_, logical)| (*logical).to_string())
                .unwrap_or_else(|| field.name.clone());
            map.insert(logical, field.id.clone());
        }
        FieldMap(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FieldMap(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The resolved target table plus its field map. Created once at start-up.
#[derive(Clone)]
pub struct HostBinding {
    table: Arc<dyn HostTable>,
    field_map: FieldMap,
}

impl HostBinding {
    /// Resolves `table_name` and maps its schema. A missing table is fatal.
    pub async fn bind(base: &dyn HostBase, table_name: &str) -> Result<Self, HostError> {
        let table = base
            .table_by_name(table_name)
            .await?
            .ok_or_else(|| HostError::TableNotFound(table_name.to_string()))?;

        let metas = table.field_meta_list().await?;
        let field_map = FieldMap::from_fields(&metas);
        info!(
            "Bound host table '{}' ({} fields, {} mapped)",
            table.name(),
            metas.len(),
            field_map.len()
        );
        if field_map.is_empty() {
            warn!("Host table '{table_name}' has no writable fields; generated rows will be empty");
        } else if field_map.get(fields::JOB_POSITION).is_none() {
            warn!("Host table '{table_name}' has no position field; title dedup is disabled");
        }

        Ok(Self { table, field_map })
    }

    #[cfg(test)]
    pub fn new(table: Arc<dyn HostTable>, field_map: FieldMap) -> Self {
        Self { table, field_map }
    }

    pub fn table(&self) -> &dyn HostTable {
        self.table.as_ref()
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Rows whose title cell is readable and non-empty.
    pub async fn list_job_openings(&self) -> Result<Vec<ExistingJobOpening>, HostError> {
        let position = self
            .field_map
            .get(fields::JOB_POSITION)
            .ok_or_else(|| HostError::FieldNotBound(fields::JOB_POSITION.to_string()))?;

        let mut openings = Vec::new();
        for record_id in self.table.record_ids().await? {
            match self.table.cell_value(&record_id, position).await {
                Ok(value) => {
                    if let Some(title) = cell_text(&value) {
                        openings.push(ExistingJobOpening {
                            record_id,
                            position: title,
                        });
                    }
                }
                Err(e) => warn!("Error reading position for record {record_id}: {e}"),
            }
        }
        Ok(openings)
    }

    /// Loads one row as an opening payload: title as name, description cell as content.
    pub async fn load_job_opening(&self, record_id: &str) -> Result<JobOpening, HostError> {
        let position = self
            .field_map
            .get(fields::JOB_POSITION)
            .ok_or_else(|| HostError::FieldNotBound(fields::JOB_POSITION.to_string()))?;

        let name = cell_text(&self.table.fresh_cell_value(record_id, position).await?)
            .ok_or_else(|| HostError::Malformed(format!("record {record_id} has no position")))?;

        let content = match self.field_map.get(fields::JOB_DESCRIPTION) {
            Some(field) => cell_text(&self.table.fresh_cell_value(record_id, field).await?),
            None => None,
        };

        Ok(JobOpening {
            content: content.unwrap_or_else(|| name.clone()),
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{InMemoryBase, InMemoryTable};
    use serde_json::json;

    fn meta(id: &str, name: &str) -> FieldMeta {
        FieldMeta {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_field_map_rules_and_exclusions() {
        let map = FieldMap::from_fields(&[
            meta("f1", "Position"),
            meta("f2", "Job Description"),
            meta("f3", "City"),
            meta("f4", "Department"),
            meta("f5", "Recruitment Type"),
            meta("f6", "Job Duties"),
            meta("f7", "Required Qualifications"),
            meta("f8", "Salary and Benefits"),
            meta("f9", "Expected Start Date"),
            meta("f10", "HR Name"),
            meta("f11", "Status"),
            meta("f12", "Requester"),
            meta("f13", "③Recruitment Progress Management"),
        ]);

        assert_eq!(map.get(fields::JOB_POSITION), Some("f1"));
        assert_eq!(map.get(fields::JOB_DESCRIPTION), Some("f2"));
        assert_eq!(map.get(fields::JOB_LOCATION), Some("f3"));
        assert_eq!(map.get(fields::DEPARTMENT), Some("f4"));
        assert_eq!(map.get(fields::JOB_TYPE), Some("f5"));
        assert_eq!(map.get(fields::JOB_DUTIES), Some("f6"));
        assert_eq!(map.get(fields::JOB_QUALIFICATION), Some("f7"));
        assert_eq!(map.get(fields::JOB_BENEFITS), Some("f8"));
        assert_eq!(map.get(fields::EXPECTED_START_DATE), Some("f9"));
        assert_eq!(map.len(), 9);
        assert_eq!(map.get("Status"), None);
    }

    #[test]
    fn test_field_map_case_insensitive_and_pass_through() {
        let map = FieldMap::from_fields(&[
            meta("a", "OPEN POSITION TITLE"),
            meta("b", "Headcount"),
        ]);
        assert_eq!(map.get(fields::JOB_POSITION), Some("a"));
        assert_eq!(map.get("Headcount"), Some("b"));
    }

    #[test]
    fn test_field_map_first_rule_wins() {
        // Contains both "position" and "department"; "position" is checked first.
        let map = FieldMap::from_fields(&[meta("x", "Department Position")]);
        assert_eq!(map.get(fields::JOB_POSITION), Some("x"));
        assert_eq!(map.get(fields::DEPARTMENT), None);
    }

    #[tokio::test]
    async fn test_bind_missing_table_is_fatal() {
        let base = InMemoryBase::new();
        let err = HostBinding::bind(&base, "Nope").await.err().unwrap();
        assert!(matches!(err, HostError::TableNotFound(ref name) if name == "Nope"));
    }

    #[tokio::test]
    async fn test_list_and_load_job_openings() {
        let table = InMemoryTable::new(
            "Jobs",
            vec![meta("fPos", "Position"), meta("fDesc", "Job Description")],
        );
        let engineer = table.insert_row([
            ("fPos", json!("Engineer")),
            ("fDesc", json!([{"type": "text", "text": "Builds systems"}])),
        ]);
        table.insert_row([("fDesc", json!("orphan description"))]);
        let base = InMemoryBase::new().with_table(table);

        let binding = HostBinding::bind(&base, "Jobs").await.unwrap();
        let openings = binding.list_job_openings().await.unwrap();
        assert_eq!(
            openings,
            vec![ExistingJobOpening {
                record_id: engineer.clone(),
                position: "Engineer".to_string()
            }]
        );

        let opening = binding.load_job_opening(&engineer).await.unwrap();
        assert_eq!(opening.name, "Engineer");
        assert_eq!(opening.content, "Builds systems");
    }
}
