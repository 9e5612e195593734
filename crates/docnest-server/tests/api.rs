mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use common::{insert_user, RecordingIndex};
use docnest_server::{
    auth::create_access_token,
    config::{Config, SearchConfig},
    create_router,
    db::MemoryStore,
    indexing::{DisabledIndex, SearchIndex},
    AppState,
};
use docnest_shared::Role;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn test_config() -> Config {
    Config {
        database_url: "memory".into(),
        jwt_secret: SECRET.into(),
        jwt_expires_in: 900,
        port: 0,
        base_url: "https://docs.example.com".into(),
        root_title: "Home".into(),
        search: SearchConfig {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            index_name: "docs".into(),
        },
        admin: None,
    }
}

struct TestApp {
    router: Router,
    root_id: i64,
    editor: String,
    viewer: String,
    admin: String,
    editor_id: i64,
    viewer_id: i64,
}

async fn app_with(index: Arc<dyn SearchIndex>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let editor = insert_user(store.as_ref(), "editor", Role::Editor).await;
    let viewer = insert_user(store.as_ref(), "viewer", Role::Viewer).await;
    let admin = insert_user(store.as_ref(), "admin", Role::Admin).await;

    let state = AppState::new(store, index, test_config());
    let root = state.tree.bootstrap_root("Home").await.unwrap();

    TestApp {
        router: create_router(state),
        root_id: root.id,
        editor: create_access_token(editor.id, "editor", Role::Editor, SECRET, 900).unwrap(),
        viewer: create_access_token(viewer.id, "viewer", Role::Viewer, SECRET, 900).unwrap(),
        admin: create_access_token(admin.id, "admin", Role::Admin, SECRET, 900).unwrap(),
        editor_id: editor.id,
        viewer_id: viewer.id,
    }
}

async fn app() -> TestApp {
    app_with(Arc::new(DisabledIndex)).await
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn create_doc(app: &TestApp, parent_id: i64, slug: &str, public: bool) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/docs",
        Some(&app.editor),
        Some(json!({ "parent_id": parent_id, "title": slug, "slug": slug, "public": public })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn health_check() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn create_returns_full_representation() {
    let app = app().await;
    let guide = create_doc(&app, app.root_id, "guide", true).await;
    assert_eq!(guide["urlpath"], "/guide");
    assert_eq!(guide["parents"][0]["id"], app.root_id);

    let intro = create_doc(&app, guide["id"].as_i64().unwrap(), "intro", true).await;
    assert_eq!(intro["urlpath"], "/guide/intro");
}

#[tokio::test]
async fn create_requires_editor() {
    let app = app().await;
    let body = json!({ "parent_id": app.root_id, "title": "x", "slug": "x" });

    let (status, _) = send(&app, "POST", "/api/v1/docs", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "POST", "/api/v1/docs", Some(&app.viewer), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "GET", "/api/v1/docs", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_errors_are_bad_requests() {
    let app = app().await;
    create_doc(&app, app.root_id, "taken", true).await;

    for (slug, parent_id) in [("Invalid Slug!", app.root_id), ("taken", app.root_id), ("ok", 9999)] {
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/docs",
            Some(&app.editor),
            Some(json!({ "parent_id": parent_id, "title": "x", "slug": slug })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{slug}: {body}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn update_and_root_protection() {
    let app = app().await;
    let doc = create_doc(&app, app.root_id, "guide", true).await;
    let id = doc["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/v1/docs/{id}"),
        Some(&app.editor),
        Some(json!({ "slug": "manual", "markdown": "# Hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["urlpath"], "/manual");
    assert_eq!(body["metadata"]["subtitles"][0]["hash"], "section-hi");

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/v1/docs/{}", app.root_id),
        Some(&app.editor),
        Some(json!({ "slug": "home" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/docs/{id}"),
        Some(&app.editor),
        Some(json!({ "parent_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn move_delete_and_restore_are_no_content() {
    let app = app().await;
    let a = create_doc(&app, app.root_id, "a", true).await["id"].as_i64().unwrap();
    create_doc(&app, app.root_id, "b", true).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/docs/{a}/move?direction=down"),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    send(
        &app,
        "PUT",
        &format!("/api/v1/docs/{a}"),
        Some(&app.editor),
        Some(json!({ "markdown": "v1" })),
    )
    .await;
    let (status, revisions) = send(
        &app,
        "GET",
        &format!("/api/v1/docs/{a}/revisions"),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let revision_id = revisions["items"][0]["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/docs/{a}/restore_revision?revision_id={revision_id}"),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/docs/{a}/restore_revision?revision_id=9999"),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/v1/docs/{a}"),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/api/v1/docs/{a}"), Some(&app.editor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/v1/docs/{}", app.root_id),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn conditional_get_returns_not_modified() {
    let app = app().await;
    let doc = create_doc(&app, app.root_id, "guide", true).await;
    let id = doc["id"].as_i64().unwrap();
    let updated_at: DateTime<Utc> = serde_json::from_value(doc["updated_at"].clone()).unwrap();
    let stamp = updated_at.to_rfc3339_opts(SecondsFormat::Micros, true);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/v1/docs/{id}?timestamp={stamp}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);

    let (status, body) = send(
        &app,
        "GET",
        "/api/v1/docs/by_path?path=guide&timestamp=2000-01-01T00:00:00Z",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["markdown"], "");
}

#[tokio::test]
async fn private_docs_are_hidden_from_anonymous_callers() {
    let app = app().await;
    let private = create_doc(&app, app.root_id, "private", false).await;
    let id = private["id"].as_i64().unwrap();

    let (status, _) = send(&app, "GET", &format!("/api/v1/docs/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &format!("/api/v1/docs/{id}"), Some(&app.viewer), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, outline) = send(&app, "GET", "/api/v1/docs/outline", None, None).await;
    assert_eq!(outline["children"], json!([]));

    let (status, _) = send(&app, "GET", "/api/v1/docs/markdown/private.md", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_disabled_is_service_unavailable() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/docs/search",
        None,
        Some(json!({ "query": "guide" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Search functionality is disabled");
}

#[tokio::test]
async fn search_filters_private_hits_for_anonymous_callers() {
    let app = app_with(Arc::new(RecordingIndex::default())).await;
    create_doc(&app, app.root_id, "guide-public", true).await;
    create_doc(&app, app.root_id, "guide-private", false).await;

    let (status, anonymous) = send(
        &app,
        "POST",
        "/api/v1/docs/search",
        None,
        Some(json!({ "query": "guide" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anonymous["total"], 1);

    let (_, member) = send(
        &app,
        "POST",
        "/api/v1/docs/search",
        Some(&app.viewer),
        Some(json!({ "query": "guide" })),
    )
    .await;
    assert_eq!(member["total"], 2);

    let (_, short) = send(
        &app,
        "POST",
        "/api/v1/docs/search",
        None,
        Some(json!({ "query": "gu" })),
    )
    .await;
    assert_eq!(short["total"], 0);
}

#[tokio::test]
async fn share_links_expose_private_docs() {
    let app = app().await;
    let private = create_doc(&app, app.root_id, "private", false).await;
    let doc_id = private["id"].as_i64().unwrap();

    let (status, link) = send(
        &app,
        "POST",
        "/api/v1/sharelinks",
        Some(&app.editor),
        Some(json!({ "doc_id": doc_id, "expiration": "never" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{link}");
    let token = link["token"].as_str().unwrap().to_string();

    let (status, shared) = send(
        &app,
        "GET",
        &format!("/api/v1/sharelinks/access/{token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shared["id"], doc_id);

    let (_, links) = send(
        &app,
        "GET",
        &format!("/api/v1/sharelinks?doc_id={doc_id}"),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(links[0]["access_count"], 1);

    let (status, _) = send(&app, "GET", "/api/v1/sharelinks/access/unknown", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sitemap_lists_public_docs() {
    let app = app().await;
    create_doc(&app, app.root_id, "guide", true).await;
    create_doc(&app, app.root_id, "secret", false).await;

    let (status, body) = send(&app, "GET", "/sitemap.xml", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let xml = body.as_str().unwrap();
    assert!(xml.contains("<loc>https://docs.example.com/guide</loc>"));
    assert!(!xml.contains("secret"));

    let (_, robots) = send(&app, "GET", "/robots.txt", None, None).await;
    assert!(robots
        .as_str()
        .unwrap()
        .contains("Sitemap: https://docs.example.com/sitemap.xml"));
}

#[tokio::test]
async fn login_issues_usable_token() {
    let app = app().await;
    let (status, auth) = send(
        &app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "editor", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(auth["role"], "editor");

    let token = auth["access_token"].as_str().unwrap();
    let (status, me) = send(&app, "GET", "/api/v1/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "editor");

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "editor", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn out_of_range_page_is_empty_not_an_error() {
    let app = app().await;
    create_doc(&app, app.root_id, "guide", true).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/docs?page={}&size=2", i64::MAX),
        Some(&app.editor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn user_management_permissions() {
    let app = app().await;
    let viewer_uri = format!("/api/v1/users/{}", app.viewer_id);

    let (status, users) = send(&app, "GET", "/api/v1/users", Some(&app.viewer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["total"], 3);

    let (status, _) = send(
        &app,
        "PUT",
        &viewer_uri,
        Some(&app.viewer),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/users/{}", app.editor_id),
        Some(&app.viewer),
        Some(json!({ "username": "renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, user) = send(
        &app,
        "PUT",
        &viewer_uri,
        Some(&app.admin),
        Some(json!({ "role": "editor" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["role"], "editor");

    let (status, _) = send(&app, "DELETE", &viewer_uri, Some(&app.editor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", &viewer_uri, Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &viewer_uri, Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", &viewer_uri, Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn password_change_requires_old_password_unless_admin() {
    let app = app().await;
    let uri = format!("/api/v1/users/{}/change-password", app.viewer_id);

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&app.viewer),
        Some(json!({ "old_password": "wrong-password", "new_password": "new-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Old password is incorrect");

    let (status, _) = send(
        &app,
        "POST",
        &uri,
        Some(&app.viewer),
        Some(json!({ "old_password": "password123", "new_password": "new-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "POST",
        &uri,
        Some(&app.admin),
        Some(json!({ "new_password": "reset-by-admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "viewer", "password": "reset-by-admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
