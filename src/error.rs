/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - ResolveError (パイプライン各段の失敗) を HTTP の意味に変換
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::roles::ResolveError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid token or unable to extract user ID")]
    InvalidToken,
    #[error("Failed to retrieve app roles")]
    CatalogUnavailable,
    #[error("Failed to retrieve role assignments")]
    AssignmentsUnavailable,
    #[error("request body too large")]
    PayloadTooLarge,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::InvalidToken => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::CatalogUnavailable | AppError::AssignmentsUnavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ResolveError> for AppError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidToken(_) => AppError::InvalidToken,
            ResolveError::CatalogUnavailable(_) => AppError::CatalogUnavailable,
            ResolveError::AssignmentCheckFailed(_) => AppError::AssignmentsUnavailable,
        }
    }
}
