//! The panel's two end-to-end flows, run as background tasks.
//!
//! JD flow: requirement files → writer health → submit → poll → host table.
//! Resume flow: selected opening + resume PDFs → analyzer health → submit → poll → ranking.

pub mod handlers;
pub mod job_descriptions;
pub mod registry;
pub mod resume_analysis;

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::host::HostError;
use crate::models::job::{JobOpening, ResumeDocument};
use crate::poller::PollError;
use crate::service_client::{ServiceError, ServiceKind};
use crate::state::AppState;

pub use registry::{WorkflowRegistry, WorkflowSnapshot, WorkflowState};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("A {0} workflow is already running")]
    AlreadyRunning(&'static str),

    #[error("Workflow {0} not found")]
    NotFound(Uuid),

    #[error("Workflow {0} is not active")]
    NotActive(Uuid),

    #[error("API health check failed. Please ensure the API is running and configuration is correct. Details: {0}")]
    Health(#[source] ServiceError),

    #[error("Failed to initiate processing. Details: {0}")]
    Submit(#[source] ServiceError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Unexpected results payload: {0}")]
    Results(#[source] serde_json::Error),

    #[error("Could not load job opening: {0}")]
    Host(#[from] HostError),

    #[error("Could not read resume '{name}': {message}")]
    Resume { name: String, message: String },
}

/// A file received from the panel.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    fn has_extension(&self, ext: &str) -> bool {
        self.name.to_lowercase().ends_with(ext)
    }

    fn is_content_type(&self, mime: &str) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with(mime))
            .unwrap_or(false)
    }
}

/// Accepts only non-empty UTF-8 `.txt` files.
pub fn requirement_files(files: Vec<UploadedFile>) -> Result<Vec<JobOpening>, WorkflowError> {
    if files.is_empty() {
        return Err(WorkflowError::Validation(
            "Please upload at least one .txt file.".to_string(),
        ));
    }
    files
        .into_iter()
        .map(|file| {
            if !file.has_extension(".txt") && !file.is_content_type("text/plain") {
                return Err(WorkflowError::Validation(format!(
                    "'{}' is not a .txt file.",
                    file.name
                )));
            }
            let content = String::from_utf8(file.bytes.to_vec()).map_err(|_| {
                WorkflowError::Validation(format!("'{}' is not valid UTF-8 text.", file.name))
            })?;
            if content.trim().is_empty() {
                return Err(WorkflowError::Validation(format!("'{}' is empty.", file.name)));
            }
            Ok(JobOpening {
                name: file.name,
                content,
            })
        })
        .collect()
}

/// Accepts only PDFs and extracts their text.
pub async fn resume_files(
    files: Vec<UploadedFile>,
) -> Result<Vec<ResumeDocument>, WorkflowError> {
    if files.is_empty() {
        return Err(WorkflowError::Validation(
            "Please upload at least one resume PDF file.".to_string(),
        ));
    }
    if let Some(file) = files
        .iter()
        .find(|f| !f.has_extension(".pdf") && !f.is_content_type("application/pdf"))
    {
        return Err(WorkflowError::Validation(format!(
            "Please upload only PDF files for resumes ('{}' is not a PDF).",
            file.name
        )));
    }

    let mut resumes = Vec::with_capacity(files.len());
    for file in files {
        let name = file.name.clone();
        let extracted =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&file.bytes))
                .await
                .map_err(|e| WorkflowError::Resume {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
        let content = extracted.map_err(|e| WorkflowError::Resume {
            name: name.clone(),
            message: e.to_string(),
        })?;
        if content.trim().is_empty() {
            return Err(WorkflowError::Resume {
                name,
                message: "no extractable text".to_string(),
            });
        }
        resumes.push(ResumeDocument::new(name, content));
    }
    Ok(resumes)
}

fn record_failure(snapshot: &mut WorkflowSnapshot, err: &WorkflowError) {
    snapshot.state = match err {
        WorkflowError::Poll(PollError::Cancelled { .. }) => WorkflowState::Cancelled,
        _ => WorkflowState::Failed,
    };
    snapshot.error = Some(err.to_string());
}

/// Validates the files and starts the JD flow in the background.
pub fn start_job_descriptions(
    state: &AppState,
    files: Vec<UploadedFile>,
) -> Result<WorkflowSnapshot, WorkflowError> {
    let openings = requirement_files(files)?;
    let (snapshot, cancel) = state.registry.begin(ServiceKind::Jdw)?;
    let id = snapshot.id;
    info!("Starting JD workflow {id} with {} files", openings.len());

    let state = state.clone();
    tokio::spawn(async move {
        let observer = state.registry.observer(id);
        let result = job_descriptions::run(
            &state.jdw,
            &state.host,
            &state.config.poll,
            &openings,
            &observer,
            &cancel,
        )
        .await;

        state.registry.finish(id, |s| match result {
            Ok(outcome) => {
                s.state = WorkflowState::Completed;
                s.job_descriptions = outcome.job_descriptions;
                s.reconcile = outcome.reconcile;
                s.warning = outcome.warning;
            }
            Err(e) => {
                error!("JD workflow {id} ended: {e}");
                record_failure(s, &e);
            }
        });
    });

    Ok(snapshot)
}

/// Resolves the selected opening, extracts resume text, and starts the analysis flow.
pub async fn start_resume_analysis(
    state: &AppState,
    record_id: &str,
    files: Vec<UploadedFile>,
) -> Result<WorkflowSnapshot, WorkflowError> {
    if record_id.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "Please select a job opening first.".to_string(),
        ));
    }
    let opening = state.host.load_job_opening(record_id).await?;
    let resumes = resume_files(files).await?;

    let (snapshot, cancel) = state.registry.begin(ServiceKind::Rar)?;
    let id = snapshot.id;
    info!(
        "Starting resume analysis {id} for '{}' with {} resumes",
        opening.name,
        resumes.len()
    );

    let state = state.clone();
    tokio::spawn(async move {
        let observer = state.registry.observer(id);
        let result = resume_analysis::run(
            &state.rar,
            &state.config.poll,
            &opening,
            &resumes,
            &observer,
            &cancel,
        )
        .await;

        state.registry.finish(id, |s| match result {
            Ok(report) => {
                s.state = WorkflowState::Completed;
                s.analysis = Some(report);
            }
            Err(e) => {
                error!("Resume analysis {id} ended: {e}");
                record_failure(s, &e);
            }
        });
    });

    Ok(snapshot)
}
