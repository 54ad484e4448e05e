pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::workflow::handlers;

/// Resume PDFs routinely exceed axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/services/health",
            get(health::services_health_handler),
        )
        .route(
            "/api/v1/job-openings",
            get(handlers::handle_list_job_openings),
        )
        .route(
            "/api/v1/job-descriptions",
            post(handlers::handle_start_job_descriptions),
        )
        .route(
            "/api/v1/resume-analyses",
            post(handlers::handle_start_resume_analysis),
        )
        .route(
            "/api/v1/workflows/:id",
            get(handlers::handle_get_workflow).delete(handlers::handle_cancel_workflow),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{Config, HostBackend, ServiceConfig};
    use crate::host::binding::fields;
    use crate::host::memory::InMemoryBase;
    use crate::host::HostBinding;
    use crate::poller::PollSettings;
    use crate::service_client::{ServiceClient, ServiceKind};
    use crate::workflow::WorkflowRegistry;

    const TABLE: &str = "Recruitment";
    const BOUNDARY: &str = "jobflow-test-boundary";

    fn service(server: &MockServer, header_name: &str) -> ServiceConfig {
        ServiceConfig {
            api_url: server.uri(),
            header_name: header_name.to_string(),
            api_key: "secret".to_string(),
        }
    }

    async fn test_state(server: &MockServer, max_attempts: u32) -> AppState {
        let config = Config {
            jdw: service(server, "DIREC-AI-JDW-API-KEY"),
            rar: service(server, "DIREC-AI-RAR-API-KEY"),
            poll: PollSettings::from_interval(Duration::from_millis(10), max_attempts),
            http_timeout: Duration::from_secs(5),
            host_backend: HostBackend::Memory,
            host_table_name: TABLE.to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            workflow_retention: 10,
        };
        let jdw = ServiceClient::new(ServiceKind::Jdw, config.jdw.clone(), config.http_timeout)
            .unwrap();
        let rar = ServiceClient::new(ServiceKind::Rar, config.rar.clone(), config.http_timeout)
            .unwrap();
        let base = InMemoryBase::with_recruitment_table(TABLE);
        let host = HostBinding::bind(&base, TABLE).await.unwrap();
        AppState {
            config,
            jdw,
            rar,
            host,
            registry: WorkflowRegistry::new(),
        }
    }

    /// (field name, file name, content)
    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: text/plain\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn upload(uri: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn mount_jdw(server: &MockServer, status_body: Value) {
        Mock::given(method("GET"))
            .and(path("/ai/jdw/v1/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ai/jdw/v1/job_description_writer"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_json(json!({"trace_id": "jd-1", "message": "Processing started"})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ai/jdw/v1/status/jd-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body))
            .mount(server)
            .await;
    }

    async fn wait_for_state(app: &Router, id: &str, wanted: &str) -> Value {
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get(&format!("/api/v1/workflows/{id}")))
                .await
                .unwrap();
            let body = json_body(response).await;
            if body["state"] == wanted {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("workflow {id} never reached {wanted}");
    }

    #[tokio::test]
    async fn test_health_reports_service_name() {
        let server = MockServer::start().await;
        let app = build_router(test_state(&server, 5).await);

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "jobflow");
    }

    #[tokio::test]
    async fn test_services_health_reports_each_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ai/jdw/v1/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ai/rar/v1/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let app = build_router(test_state(&server, 5).await);

        let body = json_body(app.oneshot(get("/api/v1/services/health")).await.unwrap()).await;
        assert_eq!(body["jdw"]["ok"], true);
        assert_eq!(body["jdw"]["service"], "jdw");
        assert_eq!(body["rar"]["ok"], false);
    }

    #[tokio::test]
    async fn test_lists_existing_job_openings() {
        let server = MockServer::start().await;
        let state = test_state(&server, 5).await;
        let position = state.host.field_map().get(fields::JOB_POSITION).unwrap().to_string();
        state
            .host
            .table()
            .add_record(HashMap::from([(position, json!("Data Analyst"))]))
            .await
            .unwrap();
        let app = build_router(state);

        let body = json_body(app.oneshot(get("/api/v1/job-openings")).await.unwrap()).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["position"], "Data Analyst");
    }

    #[tokio::test]
    async fn test_job_description_upload_runs_to_completion() {
        let server = MockServer::start().await;
        mount_jdw(
            &server,
            json!({
                "trace_id": "jd-1",
                "status": "completed",
                "progress": {"backend.txt": "completed"},
                "results": {"job_descriptions": [
                    {"job_title": "Backend Engineer", "finalized_job_description": "Build services"}
                ]}
            }),
        )
        .await;
        let app = build_router(test_state(&server, 5).await);

        let response = app
            .clone()
            .oneshot(upload(
                "/api/v1/job-descriptions",
                &[("files", Some("backend.txt"), "Need a backend engineer")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let started = json_body(response).await;
        assert_eq!(started["state"], "processing");
        assert_eq!(started["service"], "jdw");

        let id = started["id"].as_str().unwrap().to_string();
        let done = wait_for_state(&app, &id, "completed").await;
        assert_eq!(done["trace_id"], "jd-1");
        assert_eq!(done["progress"]["backend.txt"], "completed");
        assert_eq!(done["reconcile"]["written"], 1);

        let openings = json_body(app.oneshot(get("/api/v1/job-openings")).await.unwrap()).await;
        assert_eq!(openings[0]["position"], "Backend Engineer");
    }

    #[tokio::test]
    async fn test_upload_without_txt_files_is_rejected() {
        let server = MockServer::start().await;
        let app = build_router(test_state(&server, 5).await);

        let response = app
            .oneshot(upload("/api/v1/job-descriptions", &[("note", None, "hello")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_second_run_conflicts_until_cancelled() {
        let server = MockServer::start().await;
        mount_jdw(&server, json!({"trace_id": "jd-1", "status": "running"})).await;
        let app = build_router(test_state(&server, 10_000).await);
        let files = [("files", Some("a.txt"), "Need a designer")];

        let first = json_body(
            app.clone()
                .oneshot(upload("/api/v1/job-descriptions", &files))
                .await
                .unwrap(),
        )
        .await;
        let id = first["id"].as_str().unwrap().to_string();

        let second = app
            .clone()
            .oneshot(upload("/api/v1/job-descriptions", &files))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let cancel = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/workflows/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(cancel.status(), StatusCode::ACCEPTED);

        let cancelled = wait_for_state(&app, &id, "cancelled").await;
        assert!(cancelled["error"].as_str().unwrap().contains("cancelled"));

        let third = app
            .oneshot(upload("/api/v1/job-descriptions", &files))
            .await
            .unwrap();
        assert_eq!(third.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_resume_analysis_requires_known_opening() {
        let server = MockServer::start().await;
        let app = build_router(test_state(&server, 5).await);

        let missing = app
            .clone()
            .oneshot(upload(
                "/api/v1/resume-analyses",
                &[("resumes", Some("cv.pdf"), "%PDF-1.4")],
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let unknown = app
            .oneshot(upload(
                "/api/v1/resume-analyses",
                &[
                    ("record_id", None, "rec999999"),
                    ("resumes", Some("cv.pdf"), "%PDF-1.4"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let server = MockServer::start().await;
        let app = build_router(test_state(&server, 5).await);

        let response = app
            .oneshot(get(&format!("/api/v1/workflows/{}", uuid::Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
