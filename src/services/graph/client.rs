//! Identity-graph client interface used by the role resolver.
use async_trait::async_trait;
use thiserror::Error;

use crate::services::graph::types::{
    AppRoleAssignment, BearerToken, ServicePrincipal, UserIdentity,
};

pub type GraphResult<T> = Result<T, GraphError>;

/// Graph-layer errors (transport/status/body).
///
/// Note:
/// - We keep this independent from `AppError` so each pipeline stage decides how a
///   failure surfaces (400 for identity, 500 for the catalog, policy for assignments).
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph transport error: {0}")]
    Transport(String),
    #[error("graph returned status {status}: {}", .message.as_deref().unwrap_or("no error message"))]
    Status { status: u16, message: Option<String> },
    #[error("graph response decode error: {0}")]
    Decode(String),
}

impl GraphError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Read-only lookups against the identity graph.
///
/// Every call is made on behalf of the caller with the caller's own token.
#[async_trait]
pub trait GraphClient: Send + Sync + 'static {
    // Resolve the principal the token was issued to (`GET /me`).
    async fn me(&self, token: &BearerToken) -> GraphResult<UserIdentity>;

    // Service principals whose `appId` equals `app_id`, in response order.
    async fn service_principals_by_app_id(
        &self,
        token: &BearerToken,
        app_id: &str,
    ) -> GraphResult<Vec<ServicePrincipal>>;

    // First page of the user's app role assignments.
    async fn app_role_assignments(
        &self,
        token: &BearerToken,
        user: &UserIdentity,
    ) -> GraphResult<Vec<AppRoleAssignment>>;
}
