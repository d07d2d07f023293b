use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use tracing::info;

use lens_common::pipeline::UploadFile;
use lens_common::Document;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

/// Multipart intake. Every part with a filename becomes one document; the
/// whole batch is accepted or rejected before any row is written.
pub async fn upload_documents(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Vec<Document>>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            // Non-file fields (metadata, form state) are skipped.
            continue;
        };

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(format!("failed to read upload: {err}")))?;

        files.push(UploadFile {
            name: file_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest(
            "upload must contain at least one file".into(),
        ));
    }

    info!(%project_id, count = files.len(), "accepting upload batch");

    let documents = state
        .uploads
        .submit(files, &project_id, &auth.subject)
        .await?;

    Ok(Json(documents))
}

pub async fn list_documents(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<Vec<Document>>, ApiError> {
    let documents = state
        .registry
        .list_documents(&auth.subject, &project_id)
        .await?;
    Ok(Json(documents))
}

pub async fn get_document(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> Result<Json<Document>, ApiError> {
    let document = state
        .registry
        .get_document(&id)
        .await?
        .filter(|document| document.owner == auth.subject)
        .ok_or_else(|| ApiError::NotFound(format!("document not found: {id}")))?;
    Ok(Json(document))
}
