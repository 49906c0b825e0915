//! Facebook adapter against a local stub of the Graph API
//!
//! Covers the code exchange (short token, long-lived token, profile and
//! pages) and which page edge a publish lands on.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use libomnicast::app_config::{ConfigSource, ResolvedAppConfig};
use libomnicast::credentials::{FacebookCredentials, FacebookPage, PlatformCredentials};
use libomnicast::error::{OmnicastError, PlatformError};
use libomnicast::platforms::facebook::FacebookPlatform;
use libomnicast::platforms::SocialPlatform;
use libomnicast::types::{MediaKind, PlatformKind, PostType, PreparedMedia, PublishRequest};

/// Every publish edge hit, with its form
#[derive(Default)]
struct Stub {
    edges: Mutex<Vec<(String, HashMap<String, String>)>>,
}

async fn access_token(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(params.get("client_id").map(String::as_str), Some("fb-app"));
    assert_eq!(params.get("client_secret").map(String::as_str), Some("fb-secret"));
    match params.get("grant_type").map(String::as_str) {
        Some("fb_exchange_token") => {
            assert_eq!(
                params.get("fb_exchange_token").map(String::as_str),
                Some("short-token")
            );
            Json(json!({"access_token": "long-token", "token_type": "bearer", "expires_in": 5_184_000}))
        }
        _ => {
            assert_eq!(params.get("code").map(String::as_str), Some("auth-code"));
            Json(json!({"access_token": "short-token", "token_type": "bearer", "expires_in": 3600}))
        }
    }
}

async fn me(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(params.get("access_token").map(String::as_str), Some("long-token"));
    Json(json!({"id": "fb-user-1", "name": "Ada Lovelace"}))
}

async fn accounts() -> Json<Value> {
    Json(json!({
        "data": [
            {"id": "111", "name": "Main", "access_token": "main-token", "category": "Cafe"},
            {"id": "222", "name": "Side", "access_token": "side-token"},
            {"id": "333", "name": "No token"}
        ]
    }))
}

async fn page_edge(
    State(stub): State<Arc<Stub>>,
    Path((page, edge)): Path<(String, String)>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    stub.edges
        .lock()
        .await
        .push((format!("{}/{}", page, edge), form));
    match edge.as_str() {
        "photos" => Json(json!({"id": "photo-9", "post_id": format!("{}_9", page)})),
        _ => Json(json!({"id": format!("{}_8", page)})),
    }
}

async fn spawn_stub(stub: Arc<Stub>) -> String {
    let app = Router::new()
        .route("/oauth/access_token", get(access_token))
        .route("/me", get(me))
        .route("/me/accounts", get(accounts))
        .route("/{page}/{edge}", post(page_edge))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn platform(base: &str) -> FacebookPlatform {
    FacebookPlatform::with_base_urls(reqwest::Client::new(), base, format!("{}/dialog/oauth", base))
}

fn credentials() -> PlatformCredentials {
    PlatformCredentials::Facebook(FacebookCredentials {
        user_access_token: "long-token".to_string(),
        expires_at: None,
        user_id: "fb-user-1".to_string(),
        user_name: None,
        pages: vec![
            FacebookPage {
                id: "111".to_string(),
                name: "Main".to_string(),
                access_token: "main-token".to_string(),
                category: None,
            },
            FacebookPage {
                id: "222".to_string(),
                name: "Side".to_string(),
                access_token: "side-token".to_string(),
                category: None,
            },
        ],
    })
}

fn request(post_type: PostType, page_id: Option<&str>, media: Option<MediaKind>) -> PublishRequest {
    PublishRequest {
        tenant_id: "user-1".to_string(),
        platform: PlatformKind::Facebook,
        post_type,
        content: "Fresh bread today".to_string(),
        page_id: page_id.map(str::to_string),
        media: media.map(|kind| PreparedMedia {
            public_url: "https://cdn.example.com/media/user-1/bread.jpg".to_string(),
            content_type: match kind {
                MediaKind::Image => "image/jpeg".to_string(),
                MediaKind::Video => "video/mp4".to_string(),
            },
            kind,
            bytes: vec![],
        }),
        hashtags: vec![],
    }
}

#[tokio::test]
async fn test_code_exchange_loads_long_lived_token_and_pages() {
    let base = spawn_stub(Arc::new(Stub::default())).await;
    let app = ResolvedAppConfig {
        client_id: "fb-app".to_string(),
        client_secret: secrecy::SecretString::from("fb-secret".to_string()),
        redirect_url: "https://api.example.com/facebook/callback".to_string(),
        source: ConfigSource::Reseller,
    };

    let before = chrono::Utc::now().timestamp();
    let creds = platform(&base).exchange_code(&app, "auth-code").await.unwrap();

    assert_eq!(creds.access_token(), "long-token");
    assert_eq!(creds.account_id(), "fb-user-1");
    assert_eq!(creds.account_label(), "Ada Lovelace");
    assert!(creds.expires_at().unwrap() >= before + 5_184_000);

    let PlatformCredentials::Facebook(fb) = creds else {
        panic!("expected Facebook credentials");
    };
    // Pages without a token cannot be published to and are skipped
    let pages: Vec<_> = fb.pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(pages, vec!["111", "222"]);
    assert_eq!(fb.pages[0].category.as_deref(), Some("Cafe"));
}

#[tokio::test]
async fn test_image_publishes_to_chosen_page_photos() {
    let stub = Arc::new(Stub::default());
    let base = spawn_stub(Arc::clone(&stub)).await;

    let published = platform(&base)
        .publish(&credentials(), &request(PostType::Image, Some("222"), Some(MediaKind::Image)))
        .await
        .unwrap();

    assert_eq!(published.platform_post_id, "222_9");
    assert_eq!(published.account_id, "222");
    assert_eq!(
        published.permalink.as_deref(),
        Some("https://www.facebook.com/222_9")
    );

    let edges = stub.edges.lock().await;
    assert_eq!(edges.len(), 1);
    let (edge, form) = &edges[0];
    assert_eq!(edge, "222/photos");
    assert_eq!(form["access_token"], "side-token");
    assert_eq!(form["url"], "https://cdn.example.com/media/user-1/bread.jpg");
    assert_eq!(form["caption"], "Fresh bread today");
}

#[tokio::test]
async fn test_text_publishes_to_first_page_feed() {
    let stub = Arc::new(Stub::default());
    let base = spawn_stub(Arc::clone(&stub)).await;

    let published = platform(&base)
        .publish(&credentials(), &request(PostType::Text, None, None))
        .await
        .unwrap();
    assert_eq!(published.platform_post_id, "111_8");
    assert_eq!(published.account_id, "111");

    let edges = stub.edges.lock().await;
    assert_eq!(edges[0].0, "111/feed");
    assert_eq!(edges[0].1["message"], "Fresh bread today");
    assert_eq!(edges[0].1["access_token"], "main-token");
}

#[tokio::test]
async fn test_video_publishes_to_videos_edge() {
    let stub = Arc::new(Stub::default());
    let base = spawn_stub(Arc::clone(&stub)).await;

    platform(&base)
        .publish(&credentials(), &request(PostType::Video, Some("111"), Some(MediaKind::Video)))
        .await
        .unwrap();

    let edges = stub.edges.lock().await;
    assert_eq!(edges[0].0, "111/videos");
    assert!(edges[0].1.contains_key("file_url"));
    assert_eq!(edges[0].1["description"], "Fresh bread today");
}

#[tokio::test]
async fn test_requests_the_graph_cannot_take_never_reach_it() {
    let stub = Arc::new(Stub::default());
    let base = spawn_stub(Arc::clone(&stub)).await;
    let facebook = platform(&base);

    let err = facebook
        .publish(&credentials(), &request(PostType::Text, Some("999"), None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("page 999 is not connected"));

    // A text post must not drop an attached file
    let err = facebook
        .publish(&credentials(), &request(PostType::Text, None, Some(MediaKind::Image)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OmnicastError::Platform(PlatformError::Validation(_))
    ));

    assert!(stub.edges.lock().await.is_empty());
}
