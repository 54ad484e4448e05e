use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::host::ExistingJobOpening;
use crate::state::AppState;
use crate::workflow::{
    start_job_descriptions, start_resume_analysis, UploadedFile, WorkflowError, WorkflowSnapshot,
};

/// Files and plain text fields of one multipart upload.
struct Upload {
    files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let bad_upload = |e: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("Invalid upload: {e}"))
    };

    let mut upload = Upload {
        files: Vec::new(),
        fields: HashMap::new(),
    };
    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_upload)?;
                debug!("Received file '{file_name}' ({} bytes)", bytes.len());
                upload.files.push(UploadedFile {
                    name: file_name,
                    content_type,
                    bytes,
                });
            }
            None => {
                let value = field.text().await.map_err(bad_upload)?;
                upload.fields.insert(name, value);
            }
        }
    }
    Ok(upload)
}

/// GET /api/v1/job-openings
pub async fn handle_list_job_openings(
    State(state): State<AppState>,
) -> Result<Json<Vec<ExistingJobOpening>>, AppError> {
    let openings = state.host.list_job_openings().await?;
    Ok(Json(openings))
}

/// POST /api/v1/job-descriptions
pub async fn handle_start_job_descriptions(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<WorkflowSnapshot>), AppError> {
    let upload = read_upload(multipart).await?;
    let snapshot = start_job_descriptions(&state, upload.files)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// POST /api/v1/resume-analyses
pub async fn handle_start_resume_analysis(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<WorkflowSnapshot>), AppError> {
    let upload = read_upload(multipart).await?;
    let record_id = upload
        .fields
        .get("record_id")
        .map(String::as_str)
        .unwrap_or_default();
    let snapshot = start_resume_analysis(&state, record_id, upload.files).await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// GET /api/v1/workflows/:id
pub async fn handle_get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowSnapshot>, AppError> {
    let snapshot = state
        .registry
        .get(id)
        .ok_or(WorkflowError::NotFound(id))?;
    Ok(Json(snapshot))
}

/// DELETE /api/v1/workflows/:id
pub async fn handle_cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<WorkflowSnapshot>), AppError> {
    let snapshot = state.registry.cancel(id)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}
