use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use refresh_rotation::auth::TokenCodec;
use refresh_rotation::configuration::{CookieSettings, Environment, JwtSettings};
use refresh_rotation::credentials::InMemoryCredentialStore;
use refresh_rotation::error::DatabaseError;
use refresh_rotation::rotation::RotationEngine;
use refresh_rotation::routes::RefreshCookie;
use refresh_rotation::session::{
    InMemorySessionStore, NewSession, RefreshSession, SessionRecordStore,
};
use refresh_rotation::startup::run;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::Response;
use serde_json::{json, Value};
use uuid::Uuid;

const COOKIE_NAME: &str = "refresh_token";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(InMemorySessionStore::new()))
}

fn spawn_app_with(sessions: Arc<dyn SessionRecordStore>) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let jwt = JwtSettings {
        access_secret: "access-secret-key-at-least-32-characters".to_string(),
        refresh_secret: "refresh-secret-key-at-least-32-characters".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "test".to_string(),
    };
    let engine = RotationEngine::new(
        TokenCodec::new(&jwt),
        sessions,
        Arc::new(InMemoryCredentialStore::new()),
    );
    let cookie = RefreshCookie::new(
        &CookieSettings {
            name: COOKIE_NAME.to_string(),
            domain: None,
            path: "/auth".to_string(),
        },
        Environment::Local,
    );

    let server = run(listener, engine, cookie).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

/// Raw `Set-Cookie` header for the refresh cookie, if the response sent one.
fn refresh_set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", COOKIE_NAME)))
        .map(str::to_string)
}

fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

fn is_removal(set_cookie: &str) -> bool {
    cookie_value(set_cookie).is_empty() && set_cookie.contains("Max-Age=0")
}

impl TestApp {
    async fn post_credentials(&self, path: &str, email: &str, password: &str) -> Response {
        self.client
            .post(&format!("{}/auth/{}", self.address, path))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register a fresh account; returns (access token, refresh cookie value).
    async fn register(&self, email: &str) -> (String, String) {
        let response = self.post_credentials("register", email, "SecurePass123").await;
        assert_eq!(201, response.status().as_u16());

        let refresh = cookie_value(&refresh_set_cookie(&response).expect("No refresh cookie"));
        let body: Value = response.json().await.unwrap();
        let access = body["access_token"].as_str().unwrap().to_string();
        (access, refresh)
    }

    async fn post_with_cookie(&self, path: &str, refresh: Option<&str>) -> Response {
        let mut request = self.client.post(&format!("{}/auth/{}", self.address, path));
        if let Some(value) = refresh {
            request = request.header(COOKIE, format!("{}={}", COOKIE_NAME, value));
        }
        request.send().await.expect("Failed to execute request.")
    }
}

async fn assert_generic_401(response: Response) {
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["message"], "Please log in again");
}

// --- Health check ---

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app();

    let response = app
        .client
        .get(&format!("{}/health_check", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

// --- Registration and login ---

#[tokio::test]
async fn register_sets_an_http_only_refresh_cookie() {
    let app = spawn_app();

    let response = app
        .post_credentials("register", "john@example.com", "SecurePass123")
        .await;

    assert_eq!(201, response.status().as_u16());
    let set_cookie = refresh_set_cookie(&response).expect("No refresh cookie");
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/auth"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age=604800"));
    assert!(!cookie_value(&set_cookie).is_empty());

    let body: Value = response.json().await.unwrap();
    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_none());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["email"], "john@example.com");
    assert_eq!(body["user"]["role"], "user");
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let app = spawn_app();
    app.register("dup@example.com").await;

    let response = app
        .post_credentials("register", "dup@example.com", "SecurePass123")
        .await;

    assert_eq!(409, response.status().as_u16());
}

#[tokio::test]
async fn register_rejects_invalid_input() {
    let app = spawn_app();

    let test_cases = vec![
        ("not-an-email", "SecurePass123", "invalid email"),
        ("short@example.com", "short", "short password"),
    ];

    for (email, password, description) in test_cases {
        let response = app.post_credentials("register", email, password).await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Expected 400 for {}",
            description
        );
    }
}

#[tokio::test]
async fn login_issues_a_new_session() {
    let app = spawn_app();
    app.register("login@example.com").await;

    let response = app
        .post_credentials("login", "login@example.com", "SecurePass123")
        .await;

    assert_eq!(200, response.status().as_u16());
    assert!(refresh_set_cookie(&response).is_some());
}

#[tokio::test]
async fn login_with_wrong_password_or_unknown_email_is_401() {
    let app = spawn_app();
    app.register("wrong@example.com").await;

    let wrong_password = app
        .post_credentials("login", "wrong@example.com", "WrongPass123")
        .await;
    let unknown_email = app
        .post_credentials("login", "nobody@example.com", "SecurePass123")
        .await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_email.status().as_u16());
    assert!(refresh_set_cookie(&wrong_password).is_none());
}

// --- Refresh ---

#[tokio::test]
async fn refresh_rotates_the_cookie() {
    let app = spawn_app();
    let (_, refresh) = app.register("rotate@example.com").await;

    let response = app.post_with_cookie("refresh", Some(&refresh)).await;

    assert_eq!(200, response.status().as_u16());
    let rotated = cookie_value(&refresh_set_cookie(&response).expect("No refresh cookie"));
    assert!(!rotated.is_empty());
    assert_ne!(rotated, refresh);

    let body: Value = response.json().await.unwrap();
    assert!(body["access_token"].as_str().is_some());
    assert_eq!(body["expires_in"], 900);
}

#[tokio::test]
async fn refresh_without_cookie_is_401_and_clears_cookie() {
    let app = spawn_app();

    let response = app.post_with_cookie("refresh", None).await;

    let set_cookie = refresh_set_cookie(&response).expect("Cookie should be cleared");
    assert!(is_removal(&set_cookie));
    assert_generic_401(response).await;
}

#[tokio::test]
async fn refresh_with_garbage_cookie_is_401() {
    let app = spawn_app();

    let response = app.post_with_cookie("refresh", Some("garbage")).await;

    assert!(is_removal(&refresh_set_cookie(&response).unwrap()));
    assert_generic_401(response).await;
}

#[tokio::test]
async fn replayed_cookie_is_401_and_revokes_the_family() {
    let app = spawn_app();
    let (_, first) = app.register("replay@example.com").await;

    let rotated = app.post_with_cookie("refresh", Some(&first)).await;
    let second = cookie_value(&refresh_set_cookie(&rotated).unwrap());

    let replay = app.post_with_cookie("refresh", Some(&first)).await;
    assert!(is_removal(&refresh_set_cookie(&replay).unwrap()));
    assert_generic_401(replay).await;

    // The legitimate successor went down with the replayed token.
    let after = app.post_with_cookie("refresh", Some(&second)).await;
    assert_generic_401(after).await;
}

/// Session store that answers `Unavailable` while switched off
#[derive(Default)]
struct UnreliableSessionStore {
    inner: InMemorySessionStore,
    down: AtomicBool,
}

impl UnreliableSessionStore {
    fn check(&self) -> Result<(), DatabaseError> {
        if self.down.load(Ordering::SeqCst) {
            Err(DatabaseError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionRecordStore for UnreliableSessionStore {
    async fn create(&self, session: NewSession) -> Result<Uuid, DatabaseError> {
        self.check()?;
        self.inner.create(session).await
    }

    async fn find_by_identifier_hash(
        &self,
        jti_hash: &str,
    ) -> Result<Option<RefreshSession>, DatabaseError> {
        self.check()?;
        self.inner.find_by_identifier_hash(jti_hash).await
    }

    async fn mark_revoked_and_chain(
        &self,
        jti_hash: &str,
        successor_hash: &str,
    ) -> Result<bool, DatabaseError> {
        self.check()?;
        self.inner.mark_revoked_and_chain(jti_hash, successor_hash).await
    }

    async fn revoke_all_active_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        self.check()?;
        self.inner.revoke_all_active_for_user(user_id).await
    }

    async fn revoke_by_identifier_hash(&self, jti_hash: &str) -> Result<bool, DatabaseError> {
        self.check()?;
        self.inner.revoke_by_identifier_hash(jti_hash).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>, DatabaseError> {
        self.check()?;
        self.inner.list_for_user(user_id).await
    }

    async fn rotate(&self, old_hash: &str, successor: NewSession) -> Result<bool, DatabaseError> {
        self.check()?;
        self.inner.rotate(old_hash, successor).await
    }
}

#[tokio::test]
async fn refresh_during_storage_outage_is_503_and_keeps_cookie() {
    let sessions = Arc::new(UnreliableSessionStore::default());
    let app = spawn_app_with(sessions.clone());
    let (_, refresh) = app.register("outage@example.com").await;

    sessions.down.store(true, Ordering::SeqCst);
    let response = app.post_with_cookie("refresh", Some(&refresh)).await;

    assert_eq!(503, response.status().as_u16());
    assert!(refresh_set_cookie(&response).is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");

    // Once storage is back the kept cookie still rotates.
    sessions.down.store(false, Ordering::SeqCst);
    let response = app.post_with_cookie("refresh", Some(&refresh)).await;
    assert_eq!(200, response.status().as_u16());
}

// --- Logout ---

#[tokio::test]
async fn logout_always_succeeds_and_clears_cookie() {
    let app = spawn_app();

    for cookie in [None, Some("garbage")] {
        let response = app.post_with_cookie("logout", cookie).await;
        assert_eq!(200, response.status().as_u16());
        assert!(is_removal(&refresh_set_cookie(&response).unwrap()));
    }
}

#[tokio::test]
async fn logged_out_cookie_can_no_longer_refresh() {
    let app = spawn_app();
    let (_, refresh) = app.register("logout@example.com").await;

    let response = app.post_with_cookie("logout", Some(&refresh)).await;
    assert_eq!(200, response.status().as_u16());

    let response = app.post_with_cookie("refresh", Some(&refresh)).await;
    assert_generic_401(response).await;
}

#[tokio::test]
async fn logout_all_requires_an_access_token() {
    let app = spawn_app();

    let response = app.post_with_cookie("logout-all", None).await;

    assert_generic_401(response).await;
}

#[tokio::test]
async fn logout_all_revokes_every_device() {
    let app = spawn_app();
    let (access, laptop) = app.register("everywhere@example.com").await;
    let phone = app
        .post_credentials("login", "everywhere@example.com", "SecurePass123")
        .await;
    let phone = cookie_value(&refresh_set_cookie(&phone).unwrap());

    let response = app
        .client
        .post(&format!("{}/auth/logout-all", app.address))
        .bearer_auth(&access)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["revoked"], 2);

    for refresh in [laptop, phone] {
        let response = app.post_with_cookie("refresh", Some(&refresh)).await;
        assert_eq!(401, response.status().as_u16());
    }
}

// --- Protected routes ---

#[tokio::test]
async fn me_returns_the_current_user() {
    let app = spawn_app();
    let (access, _) = app.register("me@example.com").await;

    let response = app
        .client
        .get(&format!("{}/auth/me", app.address))
        .bearer_auth(&access)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "me@example.com");
}

#[tokio::test]
async fn me_rejects_refresh_token_as_bearer() {
    let app = spawn_app();
    let (_, refresh) = app.register("bearer@example.com").await;

    let response = app
        .client
        .get(&format!("{}/auth/me", app.address))
        .bearer_auth(&refresh)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_generic_401(response).await;
}
