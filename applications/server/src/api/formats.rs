/// Format listing
use crate::state::AppState;
use axum::{extract::State, Json};
use resound_audio::FormatDescriptor;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FormatInfo {
    pub extension: &'static str,
    #[serde(flatten)]
    pub descriptor: FormatDescriptor,
}

/// GET /api/formats - every format tag and what can be done with it
pub async fn list_formats(State(app_state): State<AppState>) -> Json<Vec<FormatInfo>> {
    let formats = app_state
        .transcoding
        .registry()
        .formats()
        .into_iter()
        .map(|descriptor| FormatInfo {
            extension: descriptor.tag.extension(),
            descriptor: descriptor.clone(),
        })
        .collect();

    Json(formats)
}
