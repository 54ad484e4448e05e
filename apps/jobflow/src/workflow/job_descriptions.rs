use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::WorkflowError;
use crate::host::HostBinding;
use crate::models::job::{extract_job_descriptions, JobDescription, JobOpening};
use crate::poller::{JobPoller, PollSettings, ProgressObserver};
use crate::reconcile::{reconcile, ReconcileSummary};
use crate::service_client::ServiceClient;

#[derive(Debug, Default)]
pub struct JobDescriptionOutcome {
    pub job_descriptions: Vec<JobDescription>,
    pub reconcile: Option<ReconcileSummary>,
    /// Set when generation succeeded but the table update did not.
    pub warning: Option<String>,
}

/// Health check, submit, poll to completion, then write new titles into the host table.
pub async fn run(
    jdw: &ServiceClient,
    binding: &HostBinding,
    poll: &PollSettings,
    openings: &[JobOpening],
    observer: &dyn ProgressObserver,
    cancel: &CancellationToken,
) -> Result<JobDescriptionOutcome, WorkflowError> {
    jdw.health().await.map_err(WorkflowError::Health)?;

    let start = jdw
        .submit_job_openings(openings)
        .await
        .map_err(WorkflowError::Submit)?;
    observer.on_submitted(&start.trace_id);

    let mut poller = JobPoller::new(poll.clone());
    let results = poller.run(&start.trace_id, jdw, observer, cancel).await?;

    let job_descriptions = extract_job_descriptions(&results).map_err(WorkflowError::Results)?;
    if job_descriptions.is_empty() {
        info!("Trace {} produced no job descriptions", start.trace_id);
        return Ok(JobDescriptionOutcome::default());
    }

    let (reconcile, warning) =
        match reconcile(binding.table(), binding.field_map(), &job_descriptions).await {
            Ok(summary) => (Some(summary), None),
            Err(e) => {
                warn!("Trace {}: {e}", start.trace_id);
                (
                    None,
                    Some(format!(
                        "Job descriptions were generated, but the table was not updated. {e}"
                    )),
                )
            }
        };

    Ok(JobDescriptionOutcome {
        job_descriptions,
        reconcile,
        warning,
    })
}
