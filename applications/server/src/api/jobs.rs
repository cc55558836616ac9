/// Conversion job API
use crate::{
    error::{Result, ServerError},
    state::AppState,
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use resound_core::{ConversionJob, EncodingOptions, JobId, JobState, ResoundError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SubmitQuery {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u16>,
    #[serde(default)]
    pub bit_depth: Option<u16>,
    /// kbps
    #[serde(default)]
    pub bitrate: Option<u32>,
}

impl SubmitQuery {
    fn options(&self) -> EncodingOptions {
        EncodingOptions {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_depth: self.bit_depth,
            bitrate_kbps: self.bitrate,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub state: JobState,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactQuery {
    /// Original file name; the download is offered as `<stem>.<target ext>`
    #[serde(default)]
    pub name: Option<String>,
}

/// POST /api/jobs?source=mp3&target=wav - body is the raw source file
pub async fn submit_job(
    State(app_state): State<AppState>,
    Query(query): Query<SubmitQuery>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("request body is empty".to_string()));
    }

    let job_id = app_state
        .transcoding
        .submit(body, &query.source, &query.target, query.options())
        .await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversionJob>> {
    let job = app_state.transcoding.status(&JobId::new(id))?;
    Ok(Json(job))
}

/// DELETE /api/jobs/:id
pub async fn cancel_job(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>> {
    let job_id = JobId::new(id);
    let state = app_state.transcoding.cancel(&job_id)?;
    Ok(Json(CancelResponse { job_id, state }))
}

/// GET /api/jobs/:id/artifact
pub async fn fetch_artifact(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ArtifactQuery>,
) -> Result<Response> {
    let artifact = app_state.transcoding.fetch(&JobId::new(id))?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.format.mime_type())
        .header(header::CONTENT_LENGTH, artifact.size());

    if let Some(name) = query.name.as_deref().filter(|n| !n.is_empty()) {
        let file_name: String = artifact
            .format
            .rename_file(name)
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_ascii_graphic() || c == ' ' => c,
                _ => '_',
            })
            .collect();
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
            .map_err(|_| ServerError::BadRequest("file name is not a valid header value".to_string()))?;
        response = response.header(header::CONTENT_DISPOSITION, disposition);
    }

    response
        .body(Body::from(artifact.bytes))
        .map_err(|e| ServerError::from(ResoundError::internal(e.to_string())))
}
