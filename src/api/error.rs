// src/api/error.rs
//! Mapping of domain errors onto HTTP responses.

use crate::error::DividendError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError(pub DividendError);

impl From<DividendError> for ApiError {
    fn from(err: DividendError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            DividendError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DividendError::NotFound(_) => StatusCode::NOT_FOUND,
            DividendError::CacheError(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (DividendError::InvalidInput("netuid".into()), StatusCode::BAD_REQUEST),
            (DividendError::NotFound("1/x".into()), StatusCode::NOT_FOUND),
            (DividendError::CacheError("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (DividendError::RpcError("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (DividendError::TimeoutError("slow".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status_code(), expected);
        }
    }
}
