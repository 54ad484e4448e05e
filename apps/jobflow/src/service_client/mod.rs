//! The single point of entry for calls to the two job backends.
//!
//! Both the job-description writer (JDW) and the resume analyzer/reranker (RAR)
//! expose the same three operations: health, submit, status. Only the path
//! prefix, submit path and request body differ, so one client type serves both.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, IntoUrl, Response, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::models::job::{
    AnalysisRequest, JobOpening, JobStatus, ResumeDocument, StartResponse, WriterRequest,
};
use crate::poller::StatusSource;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API health check failed (status {status}): {detail}")]
    Unhealthy { status: u16, detail: String },

    #[error("Job with trace ID {0} not found")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("API response did not include a trace_id")]
    MissingTraceId,

    #[error("Trace ID is required to check job status")]
    EmptyTraceId,

    #[error("{0} does not accept this request")]
    WrongService(&'static str),

    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),
}

/// Which backend a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Jdw,
    Rar,
}

impl ServiceKind {
    fn prefix(self) -> &'static str {
        match self {
            ServiceKind::Jdw => "/ai/jdw/v1",
            ServiceKind::Rar => "/ai/rar/v1",
        }
    }

    fn submit_path(self) -> &'static str {
        match self {
            ServiceKind::Jdw => "job_description_writer",
            ServiceKind::Rar => "analyze_and_rerank",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ServiceKind::Jdw => "JDW",
            ServiceKind::Rar => "RAR",
        }
    }
}

/// HTTP client for one backend, carrying its URL and API-key header.
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    config: ServiceConfig,
    kind: ServiceKind,
}

impl ServiceClient {
    pub fn new(
        kind: ServiceKind,
        config: ServiceConfig,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            kind,
        })
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    fn url(&self, tail: &str) -> String {
        format!(
            "{}{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.kind.prefix(),
            tail
        )
    }

    /// `{prefix}/status/{trace_id}`, with the trace id encoded as one path segment.
    fn status_url(&self, trace_id: &str) -> Result<Url, ServiceError> {
        let base = self.url("status");
        let mut url =
            Url::parse(&base).map_err(|e| ServiceError::InvalidUrl(format!("{base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(base.clone()))?
            .push(trace_id);
        Ok(url)
    }

    fn get(&self, url: impl IntoUrl) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(self.config.header_name.as_str(), self.config.api_key.as_str())
    }

    /// GET `{prefix}/health`. Anything other than a 200 with `status: "ok"` is a failure.
    pub async fn health(&self) -> Result<Value, ServiceError> {
        let url = self.url("health");
        info!("Performing {} health check on {url}", self.kind.label());

        let response = self.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!("{} health response {status}: {body}", self.kind.label());

        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        let ok = status == StatusCode::OK
            && parsed
                .as_ref()
                .and_then(|v| v.get("status"))
                .and_then(|s| s.as_str())
                == Some("ok");

        match parsed {
            Some(value) if ok => Ok(value),
            _ => Err(ServiceError::Unhealthy {
                status: status.as_u16(),
                detail: body,
            }),
        }
    }

    /// POST the requirement files to the writer. Returns the trace to poll.
    pub async fn submit_job_openings(
        &self,
        openings: &[JobOpening],
    ) -> Result<StartResponse, ServiceError> {
        if self.kind != ServiceKind::Jdw {
            return Err(ServiceError::WrongService(self.kind.label()));
        }
        let names: Vec<_> = openings.iter().map(|o| o.name.as_str()).collect();
        info!("Submitting {} job openings to JDW: {names:?}", openings.len());
        self.submit(&WriterRequest {
            job_openings: openings,
        })
        .await
    }

    /// POST the selected opening(s) and resumes to the analyzer. Returns the trace to poll.
    pub async fn submit_resume_analysis(
        &self,
        job_openings: &[JobOpening],
        resumes: &[ResumeDocument],
    ) -> Result<StartResponse, ServiceError> {
        if self.kind != ServiceKind::Rar {
            return Err(ServiceError::WrongService(self.kind.label()));
        }
        let sources: Vec<_> = resumes.iter().map(ResumeDocument::source).collect();
        info!(
            "Submitting {} resumes against {} job openings to RAR: {sources:?}",
            resumes.len(),
            job_openings.len()
        );
        self.submit(&AnalysisRequest {
            job_openings,
            resumes,
        })
        .await
    }

    async fn submit<B: Serialize + ?Sized>(&self, body: &B) -> Result<StartResponse, ServiceError> {
        let url = self.url(self.kind.submit_path());
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(self.config.header_name.as_str(), self.config.api_key.as_str())
            .json(body)
            .send()
            .await?;

        let response = error_for_status(response, None).await?;
        let body = response.text().await?;
        let start: StartResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::Malformed(format!("submit response: {e}")))?;

        if start.trace_id.trim().is_empty() {
            return Err(ServiceError::MissingTraceId);
        }
        info!(
            "{} job initiated, trace_id={} ({})",
            self.kind.label(),
            start.trace_id,
            start.message
        );
        Ok(start)
    }

    /// GET `{prefix}/status/{trace_id}`.
    pub async fn status(&self, trace_id: &str) -> Result<JobStatus, ServiceError> {
        if trace_id.trim().is_empty() {
            return Err(ServiceError::EmptyTraceId);
        }
        let url = self.status_url(trace_id)?;
        debug!("Checking {} status for {trace_id}", self.kind.label());

        let response = self.get(url).send().await?;
        let response = error_for_status(response, Some(trace_id)).await?;
        let body = response.text().await?;

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ServiceError::Malformed(format!("status response: {e}")))?;
        if !value.get("status").map(Value::is_string).unwrap_or(false) {
            warn!("Invalid status response structure for {trace_id}: {body}");
            return Err(ServiceError::Malformed(
                "status response has no string `status` field".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| ServiceError::Malformed(format!("status response: {e}")))
    }
}

#[async_trait]
impl StatusSource for ServiceClient {
    async fn check_status(&self, trace_id: &str) -> Result<JobStatus, ServiceError> {
        self.status(trace_id).await
    }
}

/// Maps non-2xx responses to errors. A 404 on a status check means the trace is unknown.
async fn error_for_status(
    response: Response,
    trace_id: Option<&str>,
) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(trace_id) = trace_id {
            return Err(ServiceError::NotFound(trace_id.to_string()));
        }
    }
    let message = response.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        status: status.as_u16(),
        message,
    })
}
