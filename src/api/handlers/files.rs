use crate::api::error::AppError;
use crate::api::middleware::context::RequestContext;
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub url: String,
}

#[utoipa::path(
    get,
    path = "/files/{id}/url",
    params(
        ("id" = String, Path, description = "File id")
    ),
    responses(
        (status = 200, description = "Time-limited download URL", body = DownloadUrlResponse),
        (status = 404, description = "File not found for this tenant")
    )
)]
pub async fn get_download_url(
    State(state): State<crate::AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> Result<Json<DownloadUrlResponse>, AppError> {
    let url = state
        .upload_service
        .download_url(ctx.tenant_id, id)
        .await?;
    Ok(Json(DownloadUrlResponse { url }))
}
