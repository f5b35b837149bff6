//! Identity-graph client implementation using reqwest.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::GraphConfig;
use crate::services::graph::client::{GraphClient, GraphError, GraphResult};
use crate::services::graph::types::{
    AppRoleAssignment, BearerToken, ServicePrincipal, UserIdentity,
};

/// HTTP transport for the identity graph.
///
/// One request per call, no retries. Timeouts come from `GraphConfig`.
#[derive(Clone, Debug)]
pub struct HttpGraphClient {
    base_url: Url,
    client: Client,
}

impl HttpGraphClient {
    pub fn new(config: &GraphConfig) -> GraphResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GraphError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }

    fn endpoint<I>(&self, segments: I) -> GraphResult<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GraphError::Transport("graph base url cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, token: &BearerToken) -> GraphResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token.as_str())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| GraphError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GraphError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GraphError::Status {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| GraphError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    id: Option<String>,
}

// OData collection envelope.
#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

// Graph errors look like {"error":{"code":"...","message":"..."}}.
fn extract_error_message(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }

    let parsed = serde_json::from_str::<serde_json::Value>(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
        .map(ToOwned::to_owned)
}

fn app_id_filter(app_id: &str) -> String {
    // OData string literals escape a single quote by doubling it.
    format!("appId eq '{}'", app_id.replace('\'', "''"))
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn me(&self, token: &BearerToken) -> GraphResult<UserIdentity> {
        let url = self.endpoint(["me"])?;
        let me: MeResponse = self.get_json(url, token).await?;

        match me.id {
            Some(id) if !id.trim().is_empty() => Ok(UserIdentity::new(id)),
            _ => Err(GraphError::Decode("user id missing from /me".to_string())),
        }
    }

    async fn service_principals_by_app_id(
        &self,
        token: &BearerToken,
        app_id: &str,
    ) -> GraphResult<Vec<ServicePrincipal>> {
        let mut url = self.endpoint(["servicePrincipals"])?;
        url.query_pairs_mut()
            .append_pair("$filter", &app_id_filter(app_id));

        let page: Collection<ServicePrincipal> = self.get_json(url, token).await?;
        Ok(page.value)
    }

    async fn app_role_assignments(
        &self,
        token: &BearerToken,
        user: &UserIdentity,
    ) -> GraphResult<Vec<AppRoleAssignment>> {
        let url = self.endpoint(["users", user.as_str(), "appRoleAssignments"])?;
        let page: Collection<AppRoleAssignment> = self.get_json(url, token).await?;
        Ok(page.value)
    }
}
