/*
 * Responsibility
 * - ResolveIdentity → FetchCatalog → CheckAssignments → Aggregate のパイプライン
 * - 段ごとの失敗を ResolveError で型として返す (HTTP への変換は error.rs)
 * - 割り当て取得の失敗は AssignmentFailurePolicy で扱いを決める
 */
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::services::graph::{BearerToken, GraphClient, GraphError, UserIdentity};
use crate::services::roles::catalog::RoleCatalog;

/// What to do when the assignment lookup fails after identity and catalog succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssignmentFailurePolicy {
    /// Report the user as holding no roles (the request still succeeds).
    #[default]
    Ignore,
    /// Fail the request.
    Propagate,
}

impl FromStr for AssignmentFailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "propagate" => Ok(Self::Propagate),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("no service principal for app id")]
    NotFound,
    #[error("{count} service principals match app id")]
    Ambiguous { count: usize },
}

/// Failure of one pipeline stage.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("identity resolution failed")]
    InvalidToken(#[source] GraphError),
    #[error("role catalog unavailable")]
    CatalogUnavailable(#[source] CatalogError),
    #[error("role assignment check failed")]
    AssignmentCheckFailed(#[source] GraphError),
}

/// Catalog role names held by the user, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignedRoles {
    names: Vec<String>,
}

impl AssignedRoles {
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl fmt::Display for AssignedRoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(","))
    }
}

/// Resolves the application roles assigned to the caller of a bearer token.
///
/// ResolveIdentity → FetchCatalog → CheckAssignments → Aggregate.
/// Each stage needs the previous one, so the three graph calls run in sequence.
/// Nothing is kept between requests.
#[derive(Clone)]
pub struct RoleResolver {
    graph: Arc<dyn GraphClient>,
    app_id: String,
    assignment_failure_policy: AssignmentFailurePolicy,
}

impl RoleResolver {
    pub fn new(
        graph: Arc<dyn GraphClient>,
        app_id: impl Into<String>,
        assignment_failure_policy: AssignmentFailurePolicy,
    ) -> Self {
        Self {
            graph,
            app_id: app_id.into(),
            assignment_failure_policy,
        }
    }

    pub async fn resolve(&self, token: &BearerToken) -> Result<AssignedRoles, ResolveError> {
        let user = self.resolve_identity(token).await?;
        let catalog = self.fetch_catalog(token).await?;
        let assigned = self.check_assignments(token, &user).await?;

        let roles = aggregate(&catalog, &assigned);
        debug!(user_id = %user, roles = %roles, "roles resolved");
        Ok(roles)
    }

    async fn resolve_identity(&self, token: &BearerToken) -> Result<UserIdentity, ResolveError> {
        match self.graph.me(token).await {
            Ok(user) => {
                debug!(user_id = %user, "identity resolved");
                Ok(user)
            }
            Err(err) => {
                warn!(stage = "identity", status = ?err.status(), error = %err, "graph lookup failed");
                Err(ResolveError::InvalidToken(err))
            }
        }
    }

    async fn fetch_catalog(&self, token: &BearerToken) -> Result<RoleCatalog, ResolveError> {
        let result = self
            .graph
            .service_principals_by_app_id(token, &self.app_id)
            .await
            .map_err(CatalogError::from)
            .and_then(|mut sps| match sps.len() {
                0 => Err(CatalogError::NotFound),
                1 => Ok(sps.remove(0)),
                count => Err(CatalogError::Ambiguous { count }),
            });

        match result {
            Ok(sp) => {
                let catalog = RoleCatalog::from_app_roles(&sp.app_roles);
                debug!(
                    app_id = %self.app_id,
                    defined = sp.app_roles.len(),
                    named = catalog.len(),
                    "role catalog fetched"
                );
                if catalog.is_empty() {
                    warn!(app_id = %self.app_id, "application defines no assignable roles");
                }
                Ok(catalog)
            }
            Err(err) => {
                let status = match &err {
                    CatalogError::Graph(e) => e.status(),
                    _ => None,
                };
                warn!(stage = "catalog", app_id = %self.app_id, status = ?status, error = %err, "graph lookup failed");
                Err(ResolveError::CatalogUnavailable(err))
            }
        }
    }

    // One fetch per request; every catalog entry is matched against this set.
    async fn check_assignments(
        &self,
        token: &BearerToken,
        user: &UserIdentity,
    ) -> Result<HashSet<String>, ResolveError> {
        match self.graph.app_role_assignments(token, user).await {
            Ok(assignments) => {
                debug!(user_id = %user, assignments = assignments.len(), "assignments fetched");
                Ok(assignments
                    .into_iter()
                    .filter_map(|a| a.app_role_id)
                    .collect())
            }
            Err(err) => {
                warn!(
                    stage = "assignments",
                    user_id = %user,
                    status = ?err.status(),
                    error = %err,
                    policy = ?self.assignment_failure_policy,
                    "graph lookup failed"
                );
                match self.assignment_failure_policy {
                    AssignmentFailurePolicy::Ignore => Ok(HashSet::new()),
                    AssignmentFailurePolicy::Propagate => {
                        Err(ResolveError::AssignmentCheckFailed(err))
                    }
                }
            }
        }
    }
}

fn aggregate(catalog: &RoleCatalog, assigned_role_ids: &HashSet<String>) -> AssignedRoles {
    let names = catalog
        .iter()
        .filter(|entry| assigned_role_ids.contains(&entry.role_id))
        .map(|entry| entry.name.clone())
        .collect();
    AssignedRoles { names }
}
