//! omni-server - HTTP surface for Omnicast
//!
//! Serves the OAuth connect flow, publishing, analytics, engage and
//! reseller app-config endpoints on top of `libomnicast`.

mod auth;
mod error;
mod routes;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use clap::Parser;
use jsonwebtoken::DecodingKey;
use libomnicast::logging::LoggingConfig;
use libomnicast::{Config, OmnicastService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OmnicastService>,
    /// HS256 key for session JWTs; header auth still works without one
    pub session_key: Option<Arc<DecodingKey>>,
}

impl AppState {
    pub fn new(service: OmnicastService) -> Self {
        let session_key = service
            .config()
            .security
            .session_secret()
            .map(|secret| Arc::new(DecodingKey::from_secret(secret.as_bytes())));
        Self {
            service: Arc::new(service),
            session_key,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "omni-server")]
#[command(version, about = "Multi-tenant social publishing API")]
struct Cli {
    /// Path to the config file (overrides OMNICAST_CONFIG)
    #[arg(short, long, env = "OMNICAST_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Address to listen on (overrides server.bind)
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

pub fn router(state: AppState) -> Router {
    let config = state.service.config();
    let upload_limit = config.server.max_upload_mb.saturating_mul(1024 * 1024);
    let media_dir = config.media.expand_dir();

    let publishing = Router::new()
        .route("/social-media/post", post(routes::publish::post_single))
        .route("/social-media/post-all", post(routes::publish::post_all))
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        .route("/health", get(routes::health))
        // OAuth connect flow
        .route("/{platform}/auth", get(routes::oauth::authorize))
        .route("/{platform}/callback", get(routes::oauth::callback))
        .route("/{platform}/connection", delete(routes::oauth::disconnect))
        .route("/integrations", get(routes::oauth::connections))
        // Publishing
        .merge(publishing)
        // Analytics
        .route("/analytics/overview", get(routes::analytics::overview))
        .route("/analytics/posts", get(routes::analytics::list_posts))
        .route("/analytics/posts/{post_id}", get(routes::analytics::get_post))
        .route(
            "/analytics/posts/{post_id}/refresh",
            post(routes::analytics::refresh_post),
        )
        // Engage
        .route("/engage/posts", get(routes::engage::list_posts))
        .route(
            "/engage/comments/{platform}/{post_id}",
            get(routes::engage::comments),
        )
        .route("/engage/comment", post(routes::engage::comment))
        // Reseller app configs
        .route("/reseller/app-configs", get(routes::reseller::list))
        .route(
            "/reseller/app-configs/{app}",
            put(routes::reseller::upsert).delete(routes::reseller::delete),
        )
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    LoggingConfig::from_section(&config.logging, cli.verbose).init();

    let bind = cli.bind.clone().unwrap_or_else(|| config.server.bind.clone());
    let service = match OmnicastService::from_config(config).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let state = AppState::new(service);
    if state.session_key.is_none() {
        warn!("No session secret configured; only gateway headers can authenticate requests");
    }
    info!(
        "Adapters registered: {:?}",
        state.service.registry().kinds()
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("omni-server listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("omni-server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            if let Some(signal) = signals.next().await {
                info!("Received signal {}, shutting down gracefully...", signal);
            }
        }
        Err(e) => {
            warn!("Signal setup failed ({}), falling back to Ctrl-C", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler failed: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler failed: {}", e);
    }
    info!("Received Ctrl-C, shutting down gracefully...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use libomnicast::credentials::{Credential, CredentialStore};
    use libomnicast::media::LocalMediaStore;
    use libomnicast::platforms::mock::{mock_credentials, MockPlatform};
    use libomnicast::platforms::PlatformRegistry;
    use libomnicast::{Database, EnvDefaults, PlatformKind, PostType};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const SESSION_SECRET: &str = "session-secret";

    async fn test_app() -> (Router, AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.security.state_secret = Some("state-secret".to_string());
        config.security.session_secret = Some(SESSION_SECRET.to_string());
        config.media.dir = temp_dir.path().join("media").to_str().unwrap().to_string();
        config.server.frontend_url = "https://app.example.com".to_string();

        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(MockPlatform::success(PlatformKind::Facebook)));
        registry.register(Arc::new(MockPlatform::success(PlatformKind::LinkedIn)));

        let media = LocalMediaStore::new(temp_dir.path().join("media"), "https://cdn.example.com/media");
        let service = OmnicastService::with_parts(
            config,
            Database::in_memory().await.unwrap(),
            registry,
            Arc::new(media),
            EnvDefaults::default(),
        )
        .unwrap();

        let state = AppState {
            service: Arc::new(service),
            session_key: Some(Arc::new(DecodingKey::from_secret(SESSION_SECRET.as_bytes()))),
        };
        (router(state.clone()), state, temp_dir)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn session_token(sub: &str, role: &str) -> String {
        let claims = serde_json::json!({
            "sub": sub,
            "role": role,
            "exp": chrono::Utc::now().timestamp() + 3600,
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SESSION_SECRET.as_bytes()),
        )
        .unwrap()
    }

    /// Multipart form body with text fields and an optional
    /// `(field, file name, content type, bytes)` file part
    fn multipart_body(
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &str, &[u8])>,
    ) -> (String, Vec<u8>) {
        let boundary = "omnicast-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    boundary, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((name, file_name, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    boundary, name, file_name, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        (format!("multipart/form-data; boundary={}", boundary), body)
    }

    async fn connect(state: &AppState, kind: PlatformKind) {
        let credential = Credential::new("user-1", "user-1", mock_credentials(kind, "tok", None));
        CredentialStore::upsert(state.service.database(), &credential)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _state, _dir) = test_app().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["platforms"], serde_json::json!(["facebook", "linkedin"]));
    }

    #[tokio::test]
    async fn test_protected_route_requires_session() {
        let (app, _state, _dir) = test_app().await;
        let response = app
            .oneshot(Request::get("/integrations").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_forged_bearer_token_is_rejected() {
        let (app, _state, _dir) = test_app().await;
        let forged = encode(
            &Header::default(),
            &serde_json::json!({"sub": "user-1", "exp": chrono::Utc::now().timestamp() + 3600}),
            &EncodingKey::from_secret(b"wrong-secret"),
        )
        .unwrap();
        let response = app
            .oneshot(
                Request::get("/integrations")
                    .header(header::AUTHORIZATION, format!("Bearer {}", forged))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_gateway_headers_and_cookie_authenticate() {
        let (app, state, _dir) = test_app().await;
        connect(&state, PlatformKind::LinkedIn).await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/integrations")
                    .header("x-user-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["result"][0]["platform"], "linkedin");
        assert!(!body.to_string().contains("\"tok\""));

        let response = app
            .oneshot(
                Request::get("/integrations")
                    .header(
                        header::COOKIE,
                        format!("automation={}", session_token("user-1", "member")),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["result"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_callback_errors_redirect_to_frontend() {
        let (app, _state, _dir) = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/facebook/callback?state=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://app.example.com/integrations?error=missing_code"
        );

        let response = app
            .oneshot(
                Request::get("/facebook/callback?code=xyz&state=tampered")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://app.example.com/integrations?error=invalid_state"
        );
    }

    #[tokio::test]
    async fn test_authorize_without_app_config_fails() {
        let (app, _state, _dir) = test_app().await;
        let response = app
            .oneshot(
                Request::get("/facebook/auth")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", session_token("user-1", "member")),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_server_error());
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Cannot connect facebook");
    }

    #[tokio::test]
    async fn test_single_post_multipart() {
        let (app, state, _dir) = test_app().await;
        connect(&state, PlatformKind::Facebook).await;

        let (content_type, body) = multipart_body(
            &[
                ("platform", "FACEBOOK"),
                ("postType", "post"),
                ("content", "Hello #world"),
            ],
            None,
        );

        let response = app
            .oneshot(
                Request::post("/social-media/post")
                    .header("x-user-id", "user-1")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert!(body["result"]["platformPostId"]
            .as_str()
            .unwrap()
            .starts_with("facebook-mock-"));

        let posts = state
            .service
            .analytics()
            .list_posts("user-1", &Default::default())
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn test_post_all_with_image_reports_each_platform() {
        let (app, state, dir) = test_app().await;
        connect(&state, PlatformKind::Facebook).await;

        let (content_type, body) = multipart_body(
            &[
                ("platforms", r#"["facebook",{"platform":"linkedin"}]"#),
                ("postType", "post"),
                ("content", "Grand opening"),
            ],
            Some(("image", "photo.jpg", "image/jpeg", &[0xff_u8, 0xd8, 0xff, 0xe0][..])),
        );
        let response = app
            .oneshot(
                Request::post("/social-media/post-all")
                    .header("x-user-id", "user-1")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Published to 1 of 2 platforms");
        assert_eq!(body["result"]["success"][0]["platform"], "facebook");
        assert_eq!(body["result"]["failed"][0]["platform"], "linkedin");
        assert!(body["result"]["failed"][0]["error"]
            .as_str()
            .unwrap()
            .contains("No linkedin account connected"));

        let posts = state
            .service
            .analytics()
            .list_posts("user-1", &Default::default())
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post.post_type, PostType::Image);
        let media_url = posts[0].post.media_url.as_deref().unwrap();
        let file_name = media_url.rsplit('/').next().unwrap();
        assert!(dir.path().join("media").join("user-1").join(file_name).exists());
    }

    #[tokio::test]
    async fn test_post_all_requires_platforms() {
        let (app, _state, _dir) = test_app().await;
        let (content_type, body) = multipart_body(&[("content", "hi")], None);
        let response = app
            .oneshot(
                Request::post("/social-media/post-all")
                    .header("x-user-id", "user-1")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reseller_routes_require_role() {
        let (app, _state, _dir) = test_app().await;
        let config_body = serde_json::json!({
            "clientId": "cid",
            "clientSecret": "very-secret",
            "redirectUrl": "https://api.example.com/facebook/callback",
        })
        .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::put("/reseller/app-configs/facebook")
                    .header("x-user-id", "user-1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(config_body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(
                Request::put("/reseller/app-configs/facebook")
                    .header("x-user-id", "user-1")
                    .header("x-user-role", "reseller")
                    .header("x-reseller-id", "reseller-1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(config_body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/reseller/app-configs")
                    .header("x-user-id", "user-1")
                    .header("x-user-role", "reseller")
                    .header("x-reseller-id", "reseller-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["result"][0]["appName"], "app/facebook");
        assert_eq!(body["result"][0]["clientId"], "cid");
        assert!(!body.to_string().contains("very-secret"));
    }

    #[tokio::test]
    async fn test_empty_comment_is_bad_request() {
        let (app, _state, _dir) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/engage/comment")
                    .header("x-user-id", "user-1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"platform": "facebook", "postId": "p1", "message": "  "})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Failed to post comment");
    }

    #[tokio::test]
    async fn test_unknown_post_refresh_is_not_found() {
        let (app, _state, _dir) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/analytics/posts/missing/refresh")
                    .header("x-user-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
