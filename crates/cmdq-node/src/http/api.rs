use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use cmdq_protocol::{ErrorCode, RequestEnvelope};
use serde_json::json;

use crate::error::NodeError;
use crate::http::HttpState;

pub fn router() -> Router<HttpState> {
    Router::new()
        .route("/ksql", post(ksql))
        .route("/health", get(health))
        .route("/log/head", get(log_head))
        .route("/functions", get(functions))
}

#[derive(Debug)]
struct ApiError(NodeError);

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        ApiError(err)
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::MalformedRequest | ErrorCode::StatementError | ErrorCode::PropertyError => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::ConsistencyTimeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::LogError | ErrorCode::ApplyHalted | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.0.to_body();
        (status_for(body.error_code), Json(body)).into_response()
    }
}

async fn ksql(State(state): State<HttpState>, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let request = RequestEnvelope::from_json_slice(&body).map_err(NodeError::from)?;
    let response = state.node.handle_request(&request).await?;
    Ok(Json(response))
}

async fn health(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let status = state.node.status()?;
    let ok = status.halted.is_none();
    Ok(Json(json!({
        "ok": ok,
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
    })))
}

async fn log_head(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let status = state.node.status()?;
    Ok(Json(json!({
        "next_offset": status.next_offset,
        "applied_offset": status.applied_offset,
    })))
}

async fn functions(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.node.functions()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_status() {
        assert_eq!(status_for(ErrorCode::MalformedRequest), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCode::PropertyError), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorCode::ConsistencyTimeout),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(ErrorCode::ApplyHalted),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
