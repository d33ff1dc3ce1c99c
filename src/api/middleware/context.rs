use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::AppState;

/// Caller identity for the request, taken from the gateway headers.
/// Absent headers fall back to the configured default tenant and an
/// anonymous user, matching how the service runs without a gateway in
/// front of it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: i64,
    pub user_id: String,
}

/// Assigns (or propagates) the request id and attaches the caller
/// context so handlers can extract it with `Extension`.
pub async fn context_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let tenant_id = req
        .headers()
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(state.config.default_tenant_id);

    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    req.extensions_mut().insert(RequestContext { tenant_id, user_id });
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert("x-request-id", value);
    }

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}
