//! Errors surfaced by the scheduled alert run.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::data_sources::WeatherError;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Missing or wrong bearer token. Nothing has been read or written.
    #[error("unauthorized")]
    Unauthorized,

    /// The station could not be read. The tracker has not been touched.
    #[error("weather data unavailable: {0}")]
    WeatherUnavailable(#[from] WeatherError),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RunError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RunError::Unauthorized => StatusCode::UNAUTHORIZED,
            RunError::WeatherUnavailable(_) => StatusCode::BAD_GATEWAY,
            RunError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RunError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "ok": false,
            "error": self.to_string(),
        }));
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RunError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            RunError::WeatherUnavailable(WeatherError::Status(503)).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RunError::Storage(anyhow::anyhow!("disk full")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
