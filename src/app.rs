/*
 * Responsibility
 * - tracing 初期化 → Config 読み込み → 依存生成 → Router 組み立て
 * - Middleware の適用 (HTTP / Security headers / CORS)
 * - axum::serve() で起動、シグナルで graceful shutdown
 */
use std::{panic, process, sync::Arc};

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{self, v1::handlers};
use crate::config::Config;
use crate::middleware;
use crate::services::graph::HttpGraphClient;
use crate::services::roles::RoleResolver;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,graph_roles=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr may be hidden depending on how the host launches the process.
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        env = ?config.app_env,
        addr = %config.addr,
        graph = %config.graph.base_url,
        tenant_id = %config.graph.tenant_id,
        client_id = %config.graph.client_id,
        assignment_failure_policy = ?config.assignment_failure_policy,
        "starting role service"
    );

    let state = build_state(&config)?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("role service stopped");
    Ok(())
}

fn build_state(config: &Config) -> Result<AppState> {
    // One HTTP client per process; reqwest pools connections internally.
    let graph = Arc::new(HttpGraphClient::new(&config.graph)?);

    let roles = RoleResolver::new(
        graph,
        config.graph.client_id.clone(),
        config.assignment_failure_policy,
    );

    Ok(AppState::new(Arc::new(roles)))
}

fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health::health))
        // Path used by static web app role sources.
        .route("/api/GetRoles", post(handlers::roles::get_roles))
        .nest("/api/v1", api::v1::routes())
        .with_state(state);

    let router = middleware::http::apply(router, config.request_timeout);
    let router = middleware::security_headers::apply(router);
    middleware::cors::apply(router, config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::config::{AppEnv, GraphConfig};
    use crate::services::roles::AssignmentFailurePolicy;

    const APP_ID: &str = "d308f3c0-app";

    fn test_config(graph_url: &str, policy: AssignmentFailurePolicy) -> Config {
        Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            app_env: AppEnv::Development,
            cors_allowed_origins: Vec::new(),
            request_timeout: Duration::from_secs(5),
            graph: GraphConfig {
                base_url: Url::parse(graph_url).unwrap(),
                tenant_id: "tenant-1".to_string(),
                client_id: APP_ID.to_string(),
                timeout: Duration::from_secs(2),
            },
            assignment_failure_policy: policy,
        }
    }

    fn app(server: &ServerGuard, policy: AssignmentFailurePolicy) -> Router {
        let config = test_config(&server.url(), policy);
        build_router(build_state(&config).unwrap(), &config)
    }

    async fn post_roles(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn filter() -> Matcher {
        Matcher::UrlEncoded("$filter".to_string(), format!("appId eq '{APP_ID}'"))
    }

    #[tokio::test]
    async fn resolves_assigned_roles() {
        let mut server = Server::new_async().await;
        let me = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_body(r#"{"id":"U1"}"#)
            .expect(1)
            .create_async()
            .await;
        let catalog = server
            .mock("GET", "/servicePrincipals")
            .match_header("authorization", "Bearer tok-1")
            .match_query(filter())
            .with_status(200)
            .with_body(
                r#"{"value":[{"appRoles":[{"id":"R1","value":"Admin"},{"id":"R2","value":"Viewer"}]}]}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let assignments = server
            .mock("GET", "/users/U1/appRoleAssignments")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_body(r#"{"value":[{"appRoleId":"R2"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Ignore),
            "/api/v1/roles",
            r#"{"accessToken":"tok-1"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"roles": ["Viewer"]}));
        me.assert_async().await;
        catalog.assert_async().await;
        assignments.assert_async().await;
    }

    #[tokio::test]
    async fn legacy_path_serves_the_same_endpoint() {
        let mut server = Server::new_async().await;
        let _me = server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"id":"U1"}"#)
            .create_async()
            .await;
        let _catalog = server
            .mock("GET", "/servicePrincipals")
            .match_query(filter())
            .with_status(200)
            .with_body(r#"{"value":[{"appRoles":[{"id":"R1","value":"Admin"}]}]}"#)
            .create_async()
            .await;
        let _assignments = server
            .mock("GET", "/users/U1/appRoleAssignments")
            .with_status(200)
            .with_body(r#"{"value":[{"appRoleId":"R1"}]}"#)
            .create_async()
            .await;

        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Ignore),
            "/api/GetRoles",
            r#"{"identityProvider":"aad","userId":"x","accessToken":"tok"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"roles": ["Admin"]}));
    }

    #[tokio::test]
    async fn identity_failure_is_400_and_stops_there() {
        let mut server = Server::new_async().await;
        let _me = server
            .mock("GET", "/me")
            .with_status(401)
            .create_async()
            .await;
        let catalog = server
            .mock("GET", "/servicePrincipals")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let assignments = server
            .mock("GET", Matcher::Regex("^/users/".to_string()))
            .expect(0)
            .create_async()
            .await;

        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Ignore),
            "/api/v1/roles",
            r#"{"accessToken":"bad"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"error": "Invalid token or unable to extract user ID"})
        );
        catalog.assert_async().await;
        assignments.assert_async().await;
    }

    #[tokio::test]
    async fn catalog_failure_is_500_and_skips_assignments() {
        let mut server = Server::new_async().await;
        let _me = server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"id":"U1"}"#)
            .create_async()
            .await;
        let _catalog = server
            .mock("GET", "/servicePrincipals")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;
        let assignments = server
            .mock("GET", "/users/U1/appRoleAssignments")
            .expect(0)
            .create_async()
            .await;

        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Ignore),
            "/api/v1/roles",
            r#"{"accessToken":"tok"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to retrieve app roles"}));
        assignments.assert_async().await;
    }

    #[tokio::test]
    async fn assignment_failure_yields_empty_roles_by_default() {
        let mut server = Server::new_async().await;
        let _me = server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"id":"U1"}"#)
            .create_async()
            .await;
        let _catalog = server
            .mock("GET", "/servicePrincipals")
            .match_query(filter())
            .with_status(200)
            .with_body(r#"{"value":[{"appRoles":[{"id":"R1","value":"Admin"}]}]}"#)
            .create_async()
            .await;
        let assignments = server
            .mock("GET", "/users/U1/appRoleAssignments")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Ignore),
            "/api/v1/roles",
            r#"{"accessToken":"tok"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"roles": []}));
        assignments.assert_async().await;
    }

    #[tokio::test]
    async fn assignment_failure_is_500_when_propagated() {
        let mut server = Server::new_async().await;
        let _me = server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"id":"U1"}"#)
            .create_async()
            .await;
        let _catalog = server
            .mock("GET", "/servicePrincipals")
            .match_query(filter())
            .with_status(200)
            .with_body(r#"{"value":[{"appRoles":[{"id":"R1","value":"Admin"}]}]}"#)
            .create_async()
            .await;
        let _assignments = server
            .mock("GET", "/users/U1/appRoleAssignments")
            .with_status(500)
            .create_async()
            .await;

        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Propagate),
            "/api/v1/roles",
            r#"{"accessToken":"tok"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to retrieve role assignments"}));
    }

    #[tokio::test]
    async fn missing_token_is_400_without_graph_calls() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        for body in [r#"{}"#, r#"{"accessToken":""}"#, "not json"] {
            let (status, json_body) = post_roles(
                app(&server, AssignmentFailurePolicy::Ignore),
                "/api/v1/roles",
                body,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(
                json_body,
                json!({"error": "Invalid token or unable to extract user ID"})
            );
        }

        any.assert_async().await;
    }

    #[tokio::test]
    async fn health_does_not_touch_graph() {
        let server = Server::new_async().await;
        let response = app(&server, AssignmentFailurePolicy::Ignore)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unassigned_or_null_role_ids_do_not_break_the_lookup() {
        let mut server = Server::new_async().await;
        let _me = server
            .mock("GET", "/me")
            .with_status(200)
            .with_body(r#"{"id":"U1"}"#)
            .create_async()
            .await;
        let _catalog = server
            .mock("GET", "/servicePrincipals")
            .match_query(filter())
            .with_status(200)
            .with_body(r#"{"value":[{"appRoles":[{"value":"Orphan"},{"id":"R1","value":"Admin"}]}]}"#)
            .create_async()
            .await;
        let _assignments = server
            .mock("GET", "/users/U1/appRoleAssignments")
            .with_status(200)
            .with_body(r#"{"value":[{"appRoleId":"R1"},{"appRoleId":null},{}]}"#)
            .create_async()
            .await;

        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Propagate),
            "/api/v1/roles",
            r#"{"accessToken":"tok"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"roles": ["Admin"]}));
    }

    #[tokio::test]
    async fn stalled_graph_hits_the_request_deadline() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = test_config(&format!("http://{addr}"), AssignmentFailurePolicy::Ignore);
        config.request_timeout = Duration::from_millis(200);
        let app = build_router(build_state(&config).unwrap(), &config);

        let (status, body) = post_roles(app, "/api/v1/roles", r#"{"accessToken":"tok"}"#).await;

        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body, json!({"error": "request timed out"}));
    }

    #[tokio::test]
    async fn oversized_body_is_413_without_graph_calls() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        // No content-length header, so the limit trips while the body is read.
        let token = "a".repeat(2 * 1024 * 1024);
        let (status, body) = post_roles(
            app(&server, AssignmentFailurePolicy::Ignore),
            "/api/v1/roles",
            &format!(r#"{{"accessToken":"{token}"}}"#),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body, json!({"error": "request body too large"}));
        any.assert_async().await;
    }

    fn production_app(server: &ServerGuard) -> Router {
        let mut config = test_config(&server.url(), AssignmentFailurePolicy::Ignore);
        config.app_env = AppEnv::Production;
        config.cors_allowed_origins = vec!["https://app.example.com".to_string()];
        build_router(build_state(&config).unwrap(), &config)
    }

    async fn health_from(app: Router, origin: &str) -> axum::response::Response {
        app.oneshot(
            Request::get("/health")
                .header(header::ORIGIN, origin)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn production_cors_echoes_only_listed_origins() {
        let server = Server::new_async().await;

        let allowed = health_from(production_app(&server), "https://app.example.com").await;
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://app.example.com"
        );

        let other = health_from(production_app(&server), "https://evil.example.com").await;
        assert_eq!(other.status(), StatusCode::OK);
        assert!(
            other
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }
}
