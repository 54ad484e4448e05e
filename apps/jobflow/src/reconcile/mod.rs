//! Writes generated job descriptions into the host table,
//! at most once per title.

use std::collections::HashSet;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::host::binding::fields;
use crate::host::{FieldMap, HostError, HostTable};
use crate::models::host::{cell_text, RecordFields};
use crate::models::job::JobDescription;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to update records in host table: {0}")]
    Host(#[from] HostError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileSummary {
    pub written: usize,
    pub skipped_duplicate: usize,
    pub skipped_empty: usize,
    pub failed: usize,
}

/// Reads every row's title once. Unreadable rows are logged and left out.
async fn snapshot_titles(
    table: &dyn HostTable,
    field_map: &FieldMap,
) -> Result<HashSet<String>, ReconcileError> {
    let mut titles = HashSet::new();
    let Some(position) = field_map.get(fields::JOB_POSITION) else {
        return Ok(titles);
    };

    for record_id in table.record_ids().await? {
        match table.cell_value(&record_id, position).await {
            Ok(value) => {
                if let Some(title) = cell_text(&value) {
                    titles.insert(title);
                }
            }
            Err(e) => warn!("Error getting title for record {record_id}: {e}"),
        }
    }
    Ok(titles)
}

/// Maps one description onto the bound fields, keeping only non-blank values.
fn build_record(job: &JobDescription, field_map: &FieldMap) -> RecordFields {
    let pairs = [
        (fields::JOB_POSITION, &job.job_title),
        (fields::JOB_DESCRIPTION, &job.finalized_job_description),
        (fields::JOB_LOCATION, &job.job_location),
        (fields::DEPARTMENT, &job.department),
        (fields::JOB_DUTIES, &job.job_duties),
        (fields::JOB_QUALIFICATION, &job.job_qualification),
        (fields::EXPECTED_START_DATE, &job.expected_start_date),
    ];

    pairs
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .filter_map(|(logical, value)| {
            field_map
                .get(logical)
                .map(|field_id| (field_id.to_string(), Value::String(value.clone())))
        })
        .collect()
}

/// Appends every description whose title is not already in the table.
///
/// Appends run concurrently; a failed append is logged and counted but does not
/// abort the batch. Only failing to enumerate the table is an error.
pub async fn reconcile(
    table: &dyn HostTable,
    field_map: &FieldMap,
    descriptions: &[JobDescription],
) -> Result<ReconcileSummary, ReconcileError> {
    let mut summary = ReconcileSummary::default();
    if descriptions.is_empty() {
        return Ok(summary);
    }

    let mut seen = snapshot_titles(table, field_map).await?;
    debug!("Existing titles: {seen:?}");

    let mut pending = Vec::new();
    for job in descriptions {
        // Untitled descriptions have nothing to dedup on.
        let titled = !job.job_title.trim().is_empty();
        if titled && seen.contains(&job.job_title) {
            info!("Skipping '{}': title already exists", job.job_title);
            summary.skipped_duplicate += 1;
            continue;
        }

        let record = build_record(job, field_map);
        if record.is_empty() {
            info!("Skipping '{}': no mappable data", job.job_title);
            summary.skipped_empty += 1;
            continue;
        }

        if titled {
            seen.insert(job.job_title.clone());
        }
        pending.push(async move { (job.job_title.as_str(), table.add_record(record).await) });
    }

    for (title, result) in join_all(pending).await {
        match result {
            Ok(record_id) => {
                debug!("Added '{title}' as {record_id}");
                summary.written += 1;
            }
            Err(e) => {
                warn!("Failed to add '{title}': {e}");
                summary.failed += 1;
            }
        }
    }

    info!(
        "Reconciled {} descriptions: {} written, {} duplicate, {} empty, {} failed",
        descriptions.len(),
        summary.written,
        summary.skipped_duplicate,
        summary.skipped_empty,
        summary.failed
    );
    Ok(summary)
}
