use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::null_as_default;

/// A structured job description produced by the writer service.
/// Any field may be absent or `null` on the wire; both become an empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub department: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expiry_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_duties: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_qualification: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expected_start_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub finalized_job_description: String,
}

/// Lifecycle state reported by a backend for a trace.
///
/// Unrecognized strings are kept verbatim in `Other` so that vocabulary drift on
/// the backend does not turn into a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl From<String> for JobState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => JobState::Pending,
            "running" => JobState::Running,
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            _ => JobState::Other(value),
        }
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => f.write_str("pending"),
            JobState::Running => f.write_str("running"),
            JobState::Completed => f.write_str("completed"),
            JobState::Failed => f.write_str("failed"),
            JobState::Other(raw) => f.write_str(raw),
        }
    }
}

/// Snapshot returned by a status check. Each poll replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub trace_id: String,
    pub status: JobState,
    /// Item (file) name → per-item status string.
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: BTreeMap<String, String>,
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body returned by both submit endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub message: String,
}

/// One named document sent to a backend (a requirement file or a job opening).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOpening {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeMetadata {
    /// Original file name; the analyzer keys its rankings by it.
    pub source: String,
}

/// A resume in the analyzer's document shape: extracted text plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeDocument {
    pub page_content: String,
    pub metadata: ResumeMetadata,
}

impl ResumeDocument {
    pub fn new(source: impl Into<String>, page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: ResumeMetadata {
                source: source.into(),
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

#[derive(Debug, Serialize)]
pub struct WriterRequest<'a> {
    pub job_openings: &'a [JobOpening],
}

#[derive(Debug, Serialize)]
pub struct AnalysisRequest<'a> {
    pub job_openings: &'a [JobOpening],
    pub resumes: &'a [ResumeDocument],
}

/// Writer results live under `results.job_descriptions`; absence means nothing was produced.
pub fn extract_job_descriptions(results: &Value) -> Result<Vec<JobDescription>, serde_json::Error> {
    match results.get("job_descriptions") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list.clone()),
    }
}
