use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use finoptima_core::form::ValidationError;
use finoptima_core::remote::ClientError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] ClientError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(ClientError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(ClientError::NotConfigured(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Upstream(err) = &self {
            tracing::warn!(
                error = %err,
                status = status.as_u16(),
                upstream_status = ?err.status_code(),
                "upstream request failed"
            );
            if !matches!(err, ClientError::NotConfigured(_)) {
                sentry_anyhow::capture_anyhow(&anyhow::Error::new(err.clone()));
            }
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maps_errors_to_statuses() {
        assert_eq!(
            ApiError::from(ValidationError::EmptyTicker).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ClientError::Timeout(Duration::from_secs(120))).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(ClientError::HttpStatus {
                status: 404,
                body: None
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(ClientError::NotConfigured("FORECAST_BASE_URL")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
