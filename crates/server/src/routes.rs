use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tiling::{AggregatedResult, ErrorKind, TaskRecord, TilingError};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub files_id: Vec<String>,
}

/// A pipeline error rendered as `{"message": ...}` with a status from its kind.
#[derive(Debug)]
pub struct ApiError(pub TilingError);

impl From<TilingError> for ApiError {
    fn from(e: TilingError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self.0.kind() {
            ErrorKind::BadRequest => format!("Prediction failed: {}", self.0),
            _ => self.0.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "message": self.message() }))).into_response()
    }
}

/// `"*"` (or nothing) allows any origin.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/model/predict", post(predict))
        .route("/healthchecker", get(healthchecker))
        .route("/tasks", get(tasks))
        .layer(cors)
        .with_state(state)
}

async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<BTreeMap<String, AggregatedResult>>, ApiError> {
    let results = state.service.predict(&request.files_id).await?;
    Ok(Json(results))
}

async fn healthchecker() -> Json<Value> {
    Json(json!({ "status": 200, "message": "pong" }))
}

async fn tasks(State(state): State<AppState>) -> Json<Vec<TaskRecord>> {
    Json(state.service.tasks().outcomes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                TilingError::ModelUnavailable("model not loaded".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                TilingError::FileNotFound("7".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                TilingError::UnsupportedFormat {
                    extension: "gif".into(),
                    allowed: "png, jpeg".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                TilingError::InvalidGrid { rows: 0, cols: 1 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (TilingError::NoImagesToMerge, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).status(), expected);
        }
    }

    #[test]
    fn test_bad_request_message_prefix() {
        let err = ApiError(TilingError::TileCountMismatch {
            expected: 2,
            actual: 1,
        });
        assert!(err.message().starts_with("Prediction failed: "));
    }

    #[test]
    fn test_cors_layer_accepts_origin_list() {
        assert!(cors_layer(&["*".to_string()]).is_ok());
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }
}
