//! Axum route handlers for the Evaluation API.

use axum::{
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::evaluation::pipeline::{EvaluationMode, EvaluationReport, EvaluationRequest};
use crate::evaluation::resume_text::extract_resume_text;
use crate::state::AppState;

pub const DOWNLOAD_FILENAME: &str = "evaluation_result.txt";

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub download: bool,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateTextRequest {
    pub resume_text: String,
    pub job_description: String,
    pub mode: Option<EvaluationMode>,
    #[serde(default)]
    pub draft: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/evaluations
///
/// Multipart upload: `resume` (PDF), `job_description`, optional `mode` and `draft`.
/// With `?download=true` the filtered result comes back as `evaluation_result.txt`.
pub async fn handle_evaluate_upload(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut resume: Option<Bytes> = None;
    let mut job_description = String::new();
    let mut mode = state.config.default_mode;
    let mut draft = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => resume = Some(field.bytes().await.map_err(multipart_error)?),
            "job_description" => job_description = field.text().await.map_err(multipart_error)?,
            "mode" => mode = parse_mode_field(&field.text().await.map_err(multipart_error)?)?,
            "draft" => draft = field.text().await.map_err(multipart_error)?.trim() == "true",
            _ => {}
        }
    }

    let resume = resume.ok_or_else(|| AppError::Validation("resume file is required".to_string()))?;
    // Cheap input checks first so a missing job description never costs a PDF parse.
    if job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "job_description cannot be empty".to_string(),
        ));
    }
    info!("Received CV upload: {} bytes", resume.len());

    let resume_text = extract_resume_text(resume, state.config.max_upload_bytes).await?;

    let report = state
        .evaluator
        .evaluate(EvaluationRequest {
            resume_text,
            job_description,
            mode,
            draft,
        })
        .await?;

    Ok(respond(report, query.download))
}

/// POST /api/v1/evaluations/text
///
/// Same pipeline for callers that already hold the resume text.
pub async fn handle_evaluate_text(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
    Json(request): Json<EvaluateTextRequest>,
) -> Result<Response, AppError> {
    let report = state
        .evaluator
        .evaluate(EvaluationRequest {
            resume_text: request.resume_text,
            job_description: request.job_description,
            mode: request.mode.unwrap_or(state.config.default_mode),
            draft: request.draft,
        })
        .await?;

    Ok(respond(report, query.download))
}

fn respond(report: EvaluationReport, download: bool) -> Response {
    if download {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
                ),
            ],
            report.result_text,
        )
            .into_response()
    } else {
        Json(report).into_response()
    }
}

fn parse_mode_field(raw: &str) -> Result<EvaluationMode, AppError> {
    match raw.trim() {
        "structured" => Ok(EvaluationMode::Structured),
        "sectioned" => Ok(EvaluationMode::Sectioned),
        other => Err(AppError::Validation(format!(
            "mode must be 'structured' or 'sectioned', got '{other}'"
        ))),
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File size exceeds upload limit".to_string())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::evaluation::pipeline::tests::{evaluator, ScriptedModel};
    use crate::routes::build_router;
    use crate::state::AppState;

    use super::*;

    const REPLY: &str = r#"{"Structure and Formatting": 15, "Content Quality": 8,
        "ATS Compatibility": 12, "Match with Job Role": 40, "Total Score": 75,
        "Suggestions": "Quantify impact", "Matching Keywords": "Rust, SQL"}"#;

    fn test_state(model: Arc<ScriptedModel>) -> AppState {
        AppState {
            evaluator: evaluator(model),
            config: Config::for_tests(),
        }
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let boundary = "cvinsight-boundary";
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::post("/api/v1/evaluations")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_text_endpoint_returns_report() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let app = build_router(test_state(model));

        let response = app
            .oneshot(json_request(
                "/api/v1/evaluations/text",
                json!({"resume_text": "Rust and SQL developer", "job_description": "Rust role"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["mode"], "structured");
        assert_eq!(body["overall_score"], 75.0);
        assert_eq!(body["matching_keywords"], json!(["Rust", "SQL"]));
        assert_eq!(body["highlighted_resume"], "**Rust** and **SQL** developer");
    }

    #[tokio::test]
    async fn test_text_endpoint_download_sets_attachment_headers() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let app = build_router(test_state(model));

        let response = app
            .oneshot(json_request(
                "/api/v1/evaluations/text?download=true",
                json!({"resume_text": "Rust developer", "job_description": "Rust role"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"evaluation_result.txt\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("\"Total Score\": 75"));
    }

    #[tokio::test]
    async fn test_text_endpoint_rejects_empty_job_description() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let app = build_router(test_state(model.clone()));

        let response = app
            .oneshot(json_request(
                "/api/v1/evaluations/text",
                json!({"resume_text": "Rust developer", "job_description": " "}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let app = build_router(test_state(model.clone()));

        let response = app
            .oneshot(multipart_request(&[
                ("job_description", None, &b"Rust role"[..]),
                ("resume", Some("cv.txt"), &b"plain text resume"[..]),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_file() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let app = build_router(test_state(model.clone()));
        let mut big = b"%PDF-1.4\n".to_vec();
        big.resize(4096, b'x');

        let response = app
            .oneshot(multipart_request(&[
                ("job_description", None, &b"Rust role"[..]),
                ("resume", Some("cv.pdf"), big.as_slice()),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_requires_resume_field() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let app = build_router(test_state(model));

        let response = app
            .oneshot(multipart_request(&[("job_description", None, &b"Rust role"[..])]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_unknown_mode() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let app = build_router(test_state(model));

        let response = app
            .oneshot(multipart_request(&[
                ("mode", None, &b"batch"[..]),
                ("job_description", None, &b"Rust role"[..]),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_mode_field() {
        assert_eq!(
            parse_mode_field(" sectioned ").unwrap(),
            EvaluationMode::Sectioned
        );
        assert!(parse_mode_field("other").is_err());
    }
}
