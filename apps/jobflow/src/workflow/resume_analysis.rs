use tokio_util::sync::CancellationToken;
use tracing::info;

use super::WorkflowError;
use crate::models::analysis::AnalysisReport;
use crate::models::job::{JobOpening, ResumeDocument};
use crate::poller::{JobPoller, PollSettings, ProgressObserver};
use crate::service_client::ServiceClient;

/// Ranks `resumes` against the selected opening and returns the parsed report.
pub async fn run(
    rar: &ServiceClient,
    poll: &PollSettings,
    opening: &JobOpening,
    resumes: &[ResumeDocument],
    observer: &dyn ProgressObserver,
    cancel: &CancellationToken,
) -> Result<AnalysisReport, WorkflowError> {
    rar.health().await.map_err(WorkflowError::Health)?;

    let start = rar
        .submit_resume_analysis(std::slice::from_ref(opening), resumes)
        .await
        .map_err(WorkflowError::Submit)?;
    observer.on_submitted(&start.trace_id);

    let mut poller = JobPoller::new(poll.clone());
    let results = poller.run(&start.trace_id, rar, observer, cancel).await?;

    let report = AnalysisReport::from_results(&results).map_err(WorkflowError::Results)?;
    info!(
        "Trace {} ranked {} candidate matches",
        start.trace_id,
        report.ranked_matches().len()
    );
    Ok(report)
}
