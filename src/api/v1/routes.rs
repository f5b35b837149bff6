/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /health, /roles
 * - 認証は呼び出し側の accessToken を Graph にそのまま渡すため、ここでは掛けない
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

use crate::api::v1::handlers::{health::health, roles::get_roles};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/roles", post(get_roles))
}
