/*
 * Responsibility
 * - /roles の request/response DTO
 * - accessToken の有無チェック (中身は検証しない、Graph 側に任せる)
 */
use serde::{Deserialize, Serialize};

use crate::services::graph::BearerToken;

/// Request body for `/roles`.
///
/// Static web app role sources post a larger envelope
/// (`identityProvider`, `userId`, `claims`, ...); only `accessToken` is read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolesRequest {
    #[serde(default)]
    pub access_token: Option<String>,
}

impl RolesRequest {
    pub fn into_bearer_token(self) -> Result<BearerToken, &'static str> {
        match self.access_token {
            Some(token) if !token.trim().is_empty() => Ok(BearerToken::new(token)),
            Some(_) => Err("accessToken is empty"),
            None => Err("accessToken is required"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub roles: Vec<String>,
}
