/*
 * Responsibility
 * - POST /roles handler
 * - body から accessToken を取り出し、RoleResolver に渡すだけ (ロジックは service 側)
 * - body 不正 / token 欠落は Graph を呼ばずに InvalidToken (400)
 * - body サイズ超過だけは PayloadTooLarge (413)
 */
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::warn;

use crate::{
    api::v1::dto::roles::{RolesRequest, RolesResponse},
    error::AppError,
    state::AppState,
};

pub async fn get_roles(
    State(state): State<AppState>,
    payload: Result<Json<RolesRequest>, JsonRejection>,
) -> Result<Json<RolesResponse>, AppError> {
    let Json(req) = payload.map_err(|rejection| {
        warn!(error = %rejection, "rejected roles request body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::InvalidToken
        }
    })?;

    let token = req.into_bearer_token().map_err(|reason| {
        warn!(reason, "rejected roles request");
        AppError::InvalidToken
    })?;

    let roles = state.roles.resolve(&token).await?;

    Ok(Json(RolesResponse {
        roles: roles.names().to_vec(),
    }))
}
