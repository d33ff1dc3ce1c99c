use crate::api::error::AppError;
use crate::api::middleware::context::RequestContext;
use crate::services::progress::UploadProgress;
use crate::services::upload_service::{UploadRequest, UploadedFile};
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
};
use futures::TryStreamExt;
use std::io::SeekFrom;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "File upload with optional `provider` and `tagId` fields"),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadedFile),
        (status = 400, description = "Missing file, missing extension, or malformed tag id"),
        (status = 413, description = "File exceeds its category size cap")
    )
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    Extension(ctx): Extension<RequestContext>,
    mut multipart: Multipart,
) -> Result<Json<UploadedFile>, AppError> {
    let mut file_name = String::new();
    let mut provider: Option<String> = None;
    let mut tag_id: Option<i64> = None;
    let mut spooled: Option<(tokio::fs::File, i64)> = None;

    // Capture errors in a result so the remaining multipart stream can
    // still be drained on failure.
    let result: Result<Json<UploadedFile>, AppError> = async {
        while let Some(mut field) = multipart.next_field().await.map_err(|e| {
            let err_msg = e.to_string();
            if err_msg.contains("length limit exceeded") {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(err_msg)
            }
        })? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                file_name = field.file_name().unwrap_or("unnamed").to_string();

                // Spool to a temporary file so the transfer path gets a
                // seekable source and a known size before any bytes go
                // to the provider.
                let std_file = tempfile::tempfile()
                    .map_err(|e| AppError::Internal(format!("Failed to stage upload: {}", e)))?;
                let mut staged = tokio::fs::File::from_std(std_file);

                let body_with_io_error = field.map_err(std::io::Error::other);
                let mut reader = StreamReader::new(body_with_io_error);
                let size = tokio::io::copy(&mut reader, &mut staged)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to stage upload: {}", e)))?;
                staged
                    .flush()
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to stage upload: {}", e)))?;
                staged
                    .seek(SeekFrom::Start(0))
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to stage upload: {}", e)))?;

                spooled = Some((staged, size as i64));
            } else if name == "provider" {
                let text = field.text().await.unwrap_or_default();
                if !text.is_empty() {
                    provider = Some(text);
                }
            } else if name == "tagId" {
                let text = field.text().await.unwrap_or_default();
                if !text.is_empty() {
                    tag_id = Some(
                        text.parse()
                            .map_err(|_| AppError::BadRequest("wrong tag ID".to_string()))?,
                    );
                }
            } else {
                // unknown field, drain it
                while let Ok(Some(_)) = field.chunk().await {}
            }
        }

        let (source, size) =
            spooled.ok_or(AppError::BadRequest("No file provided".to_string()))?;

        let uploaded = state
            .upload_service
            .process_upload(UploadRequest {
                file_name,
                size,
                source,
                provider,
                tag_id,
                tenant_id: ctx.tenant_id,
                user_id: ctx.user_id.clone(),
            })
            .await?;

        Ok(Json(uploaded))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Consume the remaining multipart stream to avoid a TCP
            // reset surfacing as a network error in browsers.
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/upload/{id}/progress",
    params(
        ("id" = String, Path, description = "Upload id returned by the upload endpoint")
    ),
    responses(
        (status = 200, description = "Current progress snapshot", body = UploadProgress),
        (status = 404, description = "Unknown or already evicted upload id")
    )
)]
pub async fn get_upload_progress(
    State(state): State<crate::AppState>,
    Path(id): Path<u64>,
) -> Result<Json<UploadProgress>, AppError> {
    state
        .tracker
        .get(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no progress for upload {}", id)))
}
