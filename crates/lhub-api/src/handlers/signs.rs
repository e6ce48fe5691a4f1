//! Sign upload handler.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

use lhub_models::{PoseAnalysis, SignForm, SignRecord, UploadMeta, ValidationError};
use lhub_pipeline::SignUpload;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Created sign, with the pose summary when validation ran.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignView {
    #[serde(flatten)]
    pub record: SignRecord,
    pub pose_analysis: Option<PoseAnalysis>,
}

#[derive(Debug, Serialize)]
pub struct CreateSignResponse {
    pub sign: SignView,
}

struct VideoPart {
    meta: UploadMeta,
    data: Vec<u8>,
}

/// `POST /signs`: multipart with a `file` video part plus form fields.
pub async fn create_sign(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CreateSignResponse>)> {
    let policy = &state.pipeline.config().upload_policy;

    let mut video: Option<VideoPart> = None;
    let mut gloss = None;
    let mut description = None;
    let mut category = None;
    let mut metadata: Option<serde_json::Value> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let meta = UploadMeta::new(
                    field.content_type().unwrap_or_default(),
                    field.file_name().unwrap_or("upload"),
                );
                // Type is checked before any of the body is read.
                policy.validate(&meta)?;

                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    let size = (data.len() + chunk.len()) as u64;
                    if size > policy.max_bytes {
                        return Err(ValidationError::TooLarge {
                            size,
                            max: policy.max_bytes,
                        }
                        .into());
                    }
                    data.extend_from_slice(&chunk);
                }

                let meta = meta.with_size(data.len() as u64);
                video = Some(VideoPart { meta, data });
            }
            "gloss" => gloss = Some(field.text().await.map_err(multipart_error)?),
            "description" => description = Some(field.text().await.map_err(multipart_error)?),
            "category" => category = Some(field.text().await.map_err(multipart_error)?),
            "metadata" => {
                let text = field.text().await.map_err(multipart_error)?;
                let value = serde_json::from_str(&text)
                    .map_err(|e| ApiError::bad_request(format!("Invalid metadata: {e}")))?;
                metadata = Some(value);
            }
            other => debug!("Ignoring multipart field {}", other),
        }
    }

    let VideoPart { meta, data } = video.ok_or(ValidationError::MissingFile)?;

    let mut form = SignForm::from_fields(gloss, description, category);
    if let Some(metadata) = &metadata {
        form = form.with_client_metadata(metadata);
    }

    let outcome = state
        .pipeline
        .process(SignUpload::new(meta, form, Cursor::new(data)))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSignResponse {
            sign: SignView {
                record: outcome.record,
                pose_analysis: outcome.pose_analysis,
            },
        }),
    ))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}
