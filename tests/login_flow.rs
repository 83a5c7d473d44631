//! HTTP-level tests for the login pipeline
//!
//! Drives the full router with `tower::ServiceExt::oneshot` against an
//! in-memory SQLite database.

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use schoolgate::{
    api::{build_router, AppState},
    config::{Config, Environment},
    db::{
        create_test_pool, migrations,
        repositories::{AttemptRepository, SqlxAttemptRepository},
        DatabasePool, DynDatabasePool,
    },
    models::{FailureReason, NewAttempt},
    services::{hash_password, SecurityEvent, SecurityEventKind, SecurityEventSink},
};

const PASSWORD: &str = "admin123";

static PASSWORD_HASH: Lazy<String> =
    Lazy::new(|| hash_password(PASSWORD).expect("Failed to hash password"));

#[derive(Default)]
struct RecordingSink {
    kinds: Mutex<Vec<SecurityEventKind>>,
}

#[async_trait::async_trait]
impl SecurityEventSink for RecordingSink {
    async fn deliver(&self, event: &SecurityEvent) -> anyhow::Result<()> {
        self.kinds.lock().unwrap().push(event.kind);
        Ok(())
    }
}

struct TestApp {
    router: Router,
    attempts: Arc<dyn AttemptRepository>,
    sink: Arc<RecordingSink>,
}

async fn seed(pool: &DynDatabasePool, username: &str, role: &str, full_name: Option<&str>, osis: bool) {
    seed_with_hash(pool, username, role, full_name, osis, PASSWORD_HASH.as_str()).await;
}

async fn seed_with_hash(
    pool: &DynDatabasePool,
    username: &str,
    role: &str,
    full_name: Option<&str>,
    osis: bool,
    password_hash: &str,
) {
    let sqlite = pool.as_sqlite().expect("SQLite pool");
    let id = sqlx::query("INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, ?, ?)")
        .bind(username)
        .bind(format!("{}@smp.example.sch.id", username))
        .bind(password_hash)
        .bind(role)
        .execute(sqlite)
        .await
        .expect("Failed to seed user")
        .last_insert_rowid();
    sqlx::query("INSERT INTO user_profiles (user_id, full_name, osis_access) VALUES (?, ?, ?)")
        .bind(id)
        .bind(full_name)
        .bind(osis)
        .execute(sqlite)
        .await
        .expect("Failed to seed profile");
}

async fn spawn_app_with(config: Config) -> TestApp {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    seed(&pool, "admin", "ADMIN", Some("Administrator"), false).await;
    seed(&pool, "alice", "SISWA", Some("Alice Rahma"), false).await;
    seed(&pool, "rina", "SISWA", None, true).await;
    seed(&pool, "ppdb001", "PPDB_STAFF", Some("Officer PPDB"), false).await;
    // Provisioned by user management with bcrypt
    let bcrypt_hash = bcrypt::hash(PASSWORD, 4).expect("Failed to bcrypt password");
    seed_with_hash(&pool, "kesiswaan", "KESISWAAN", Some("Staff Kesiswaan"), false, &bcrypt_hash).await;

    let sink = Arc::new(RecordingSink::default());
    let attempts = SqlxAttemptRepository::boxed(pool.clone());
    let state = AppState::build(config, pool, sink.clone()).expect("Failed to build state");
    let router = build_router(state).expect("Failed to build router");

    TestApp {
        router,
        attempts,
        sink,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(Config::default()).await
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestResponse {
    fn session_cookie(&self) -> String {
        let set_cookie = self.headers[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> TestResponse {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

async fn login(app: &TestApp, ip: &str, body: Value) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Mozilla/5.0 (test)")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get(app: &TestApp, uri: &str, cookie: Option<&str>, authorization: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

fn credentials(username: &str, password: &str, role: &str) -> Value {
    json!({ "username": username, "password": password, "role": role })
}

async fn wait_for_events() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn successful_login_sets_cookie_and_hides_secrets() {
    let app = spawn_app().await;
    let res = login(&app, "203.0.113.5", credentials("admin", PASSWORD, "admin")).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["message"], "Login successful");

    let user = &res.body["user"];
    assert_eq!(user["username"], "admin");
    assert_eq!(user["name"], "Administrator");
    assert_eq!(user["role"], "admin");
    assert_eq!(user["email"], "admin@smp.example.sch.id");
    assert_eq!(
        user["permissions"],
        json!(["read", "write", "delete", "manage_users", "view_reports"])
    );

    let set_cookie = res.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("auth-token="));
    for attribute in ["HttpOnly", "Secure", "SameSite=Strict", "Max-Age=86400", "Path=/"] {
        assert!(set_cookie.contains(attribute), "missing {}", attribute);
    }

    let token = res.session_cookie().trim_start_matches("auth-token=").to_string();
    let body = res.body.to_string();
    assert!(!body.contains(&token));
    assert!(!body.contains("argon2"));
    assert!(!body.contains("password"));

    wait_for_events().await;
    assert!(app.sink.kinds.lock().unwrap().contains(&SecurityEventKind::LoginSuccess));
}

#[tokio::test]
async fn bcrypt_provisioned_account_can_sign_in() {
    let app = spawn_app().await;
    let res = login(&app, "203.0.113.15", credentials("kesiswaan", PASSWORD, "kesiswaan")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["name"], "Staff Kesiswaan");

    let res = login(&app, "203.0.113.15", credentials("kesiswaan", "wrong", "kesiswaan")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Invalid credentials or role");
}

#[tokio::test]
async fn forwarded_chain_records_left_most_address() {
    let app = spawn_app().await;
    let res = login(&app, "203.0.113.5, 10.0.0.1", credentials("alice", "wrong", "siswa")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let rows = app.attempts.list_by_account("alice", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].network_identity, "203.0.113.5");
    assert_eq!(rows[0].user_agent, "Mozilla/5.0 (test)");
}

#[tokio::test]
async fn sixth_attempt_from_same_identity_is_rate_limited() {
    let app = spawn_app().await;
    for _ in 0..5 {
        let res = login(&app, "198.51.100.7", credentials("bob", "guess", "siswa")).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    // Correct credentials for another account do not help
    let res = login(&app, "198.51.100.7", credentials("admin", PASSWORD, "admin")).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.body["lockType"], "ip");
    assert_eq!(res.body["retryAfter"], 900);
    assert_eq!(res.body["remainingAttempts"], 0);
    assert_eq!(res.headers[header::RETRY_AFTER], "900");

    // The blocked attempt itself was not written
    assert_eq!(app.attempts.count_all().await.unwrap(), 5);

    wait_for_events().await;
    assert!(app.sink.kinds.lock().unwrap().contains(&SecurityEventKind::RateLimited));
}

#[tokio::test]
async fn account_lock_spans_identities_and_a_day() {
    let app = spawn_app().await;
    let now = Utc::now();
    for i in 0..10 {
        let attempt = NewAttempt::failure(
            &format!("192.0.2.{}", i + 1),
            "alice",
            "ua",
            FailureReason::InvalidPassword,
        )
        .at(now - Duration::minutes(23 * 60) + Duration::minutes(i * 130));
        app.attempts.insert(&attempt).await.unwrap();
    }

    let res = login(&app, "192.0.2.200", credentials("alice", PASSWORD, "siswa")).await;
    assert_eq!(res.status, StatusCode::LOCKED);
    assert_eq!(res.body["lockType"], "account");
    assert_eq!(res.body["retryAfter"], 86400);

    wait_for_events().await;
    assert!(app.sink.kinds.lock().unwrap().contains(&SecurityEventKind::AccountLocked));
}

#[tokio::test]
async fn success_resolves_earlier_failures() {
    let app = spawn_app().await;
    let res = login(&app, "203.0.113.20", credentials("alice", "wrong", "siswa")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = login(&app, "203.0.113.20", credentials("alice", PASSWORD, "siswa")).await;
    assert_eq!(res.status, StatusCode::OK);

    let since = Utc::now() - Duration::hours(24);
    assert_eq!(app.attempts.count_failures_by_account("alice", since).await.unwrap(), 0);
    assert_eq!(app.attempts.count_failures_by_identity("203.0.113.20", since).await.unwrap(), 0);

    // Resolved rows stay for audit
    let rows = app.attempts.list_by_account("alice", 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| !r.succeeded && r.resolved));
}

#[tokio::test]
async fn wrong_role_and_wrong_password_look_identical() {
    let app = spawn_app().await;
    let wrong_role = login(&app, "203.0.113.30", credentials("alice", PASSWORD, "kesiswaan")).await;
    let wrong_password = login(&app, "203.0.113.31", credentials("alice", "nope", "siswa")).await;
    let unknown_user = login(&app, "203.0.113.32", credentials("ghost", PASSWORD, "siswa")).await;

    for res in [&wrong_role, &wrong_password, &unknown_user] {
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert!(res.headers.get(header::SET_COOKIE).is_none());
    }
    assert_eq!(wrong_role.body, wrong_password.body);
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(wrong_role.body["error"], "Invalid credentials or role");

    let rows = app.attempts.list_by_account("alice", 10).await.unwrap();
    let mut reasons: Vec<_> = rows.iter().filter_map(|r| r.failure_reason.clone()).collect();
    reasons.sort();
    assert_eq!(reasons, vec!["invalid password", "user not found"]);
}

#[tokio::test]
async fn invalid_role_is_rejected_and_counted() {
    let app = spawn_app().await;
    let res = login(&app, "203.0.113.40", credentials("alice", PASSWORD, "headmaster")).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Invalid role");

    let rows = app.attempts.list_by_identity("203.0.113.40", 10).await.unwrap();
    assert_eq!(rows[0].failure_reason.as_deref(), Some("invalid role"));
}

#[tokio::test]
async fn missing_fields_and_bad_bodies_are_bad_requests() {
    let app = spawn_app().await;
    for body in [
        json!({ "username": "alice", "password": PASSWORD }),
        json!({ "username": "", "password": PASSWORD, "role": "siswa" }),
        json!({}),
    ] {
        let res = login(&app, "203.0.113.50", body).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))
        .unwrap();
    assert_eq!(send(&app, request).await.status, StatusCode::BAD_REQUEST);

    assert_eq!(app.attempts.count_all().await.unwrap(), 0);
}

#[tokio::test]
async fn honeypot_rejects_bots() {
    let app = spawn_app().await;
    let mut body = credentials("admin", PASSWORD, "admin");
    body["honeypot"] = json!("https://spam.example");

    let res = login(&app, "203.0.113.60", body).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Security check failed");
    assert_eq!(app.attempts.count_all().await.unwrap(), 0);

    wait_for_events().await;
    assert_eq!(*app.sink.kinds.lock().unwrap(), vec![SecurityEventKind::BotDetected]);
}

#[tokio::test]
async fn osis_login_through_student_profile() {
    let app = spawn_app().await;
    let res = login(&app, "203.0.113.70", credentials("rina", PASSWORD, "osis")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["role"], "osis");
    assert_eq!(res.body["user"]["name"], "rina");

    let res = login(&app, "203.0.113.71", credentials("alice", PASSWORD, "osis")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verify_accepts_valid_cookie_only() {
    let app = spawn_app().await;
    let res = login(&app, "203.0.113.80", credentials("ppdb001", PASSWORD, "ppdb-officer")).await;
    let cookie = res.session_cookie();

    let res = get(&app, "/api/auth/verify", Some(&cookie), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["username"], "ppdb001");
    assert_eq!(res.body["user"]["role"], "ppdb-officer");

    let res = get(&app, "/api/auth/verify", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "No token found");

    let tampered = format!("{}x", cookie);
    let res = get(&app, "/api/auth/verify", Some(&tampered), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Invalid token");
}

#[tokio::test]
async fn logout_expires_cookie() {
    let app = spawn_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .body(Body::empty())
        .unwrap();
    let res = send(&app, request).await;

    assert_eq!(res.status, StatusCode::OK);
    let set_cookie = res.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("auth-token=;"));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn login_stats_require_admin() {
    let app = spawn_app().await;
    let _ = login(&app, "203.0.113.90", credentials("alice", "wrong", "siswa")).await;

    let admin = login(&app, "203.0.113.91", credentials("admin", PASSWORD, "admin")).await;
    let res = get(
        &app,
        "/api/admin/security/login-stats?username=alice",
        Some(&admin.session_cookie()),
        None,
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["totalAttempts"], 2);
    assert_eq!(res.body["failedInIdentityWindow"], 1);
    assert_eq!(res.body["recent"].as_array().unwrap().len(), 1);

    let student = login(&app, "203.0.113.92", credentials("alice", PASSWORD, "siswa")).await;
    let res = get(
        &app,
        "/api/admin/security/login-stats",
        Some(&student.session_cookie()),
        None,
    )
    .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = get(&app, "/api/admin/security/login-stats", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cleanup_deletes_rows_past_retention() {
    let app = spawn_app().await;
    let now = Utc::now();
    for days in [10, 29, 31, 45] {
        let attempt = NewAttempt::failure("203.0.113.100", "bob", "ua", FailureReason::UserNotFound)
            .at(now - Duration::days(days));
        app.attempts.insert(&attempt).await.unwrap();
    }

    // Development without a cron secret accepts the trigger
    let res = get(&app, "/api/cron/cleanup-logs", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["deletedCount"], 2);
    assert_eq!(app.attempts.count_all().await.unwrap(), 2);
}

#[tokio::test]
async fn cleanup_requires_secret_in_production() {
    let mut config = Config::default();
    config.environment = Environment::Production;
    config.auth.jwt_secret = Some("production-signing-secret-0123456789abcdef".to_string());
    config.retention.cron_secret = Some("cron-s3cret".to_string());
    let app = spawn_app_with(config).await;

    let res = get(&app, "/api/cron/cleanup-logs", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = get(&app, "/api/cron/cleanup-logs", None, Some("Bearer wrong")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = get(&app, "/api/cron/cleanup-logs", None, Some("Bearer cron-s3cret")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["deletedCount"], 0);
}
