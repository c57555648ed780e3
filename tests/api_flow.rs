use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use clinic_backend::api::{router, AppState};
use clinic_backend::auth::JwtHandler;
use clinic_backend::models::{NewPatient, Page, Patient, PatientChanges, PatientListing};
use clinic_backend::store::{PatientRepository, Repositories, TokenRepository};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

fn test_state() -> AppState {
    test_state_with(Repositories::in_memory())
}

fn test_state_with(repos: Repositories) -> AppState {
    AppState::new(
        repos,
        Arc::new(JwtHandler::new(
            b"integration-test-secret",
            chrono::Duration::hours(24),
        )),
        4,
    )
    .unwrap()
}

fn test_router() -> Router {
    router(test_state(), Duration::from_secs(60))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(format!("/api/v1{uri}"));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register_and_login(app: &Router, username: &str, role: &str) -> String {
    let (status, _) = send(
        app,
        "POST",
        "/register",
        None,
        Some(json!({
            "username": username,
            "password": "pw1",
            "email": format!("{username}@x.com"),
            "full_name": format!("{username} full"),
            "user_type": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        "POST",
        "/login",
        None,
        Some(json!({ "username": username, "password": "pw1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

/// Denylist whose backing store is unreachable.
struct BrokenDenylist;

#[async_trait]
impl TokenRepository for BrokenDenylist {
    async fn invalidate(&self, _token: &str, _expires_at: DateTime<Utc>) -> anyhow::Result<()> {
        anyhow::bail!("denylist offline")
    }

    async fn is_invalid(&self, _token: &str, _now: DateTime<Utc>) -> anyhow::Result<bool> {
        anyhow::bail!("denylist offline")
    }

    async fn cleanup(&self, _now: DateTime<Utc>) -> anyhow::Result<u64> {
        anyhow::bail!("denylist offline")
    }
}

/// Patient store that counts every call before delegating.
struct CountingPatients {
    inner: Arc<dyn PatientRepository>,
    calls: AtomicUsize,
}

impl CountingPatients {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PatientRepository for CountingPatients {
    async fn create(&self, registered_by: Uuid, patient: &NewPatient) -> anyhow::Result<Uuid> {
        self.tick();
        self.inner.create(registered_by, patient).await
    }

    async fn list(&self, page: Page) -> anyhow::Result<(Vec<PatientListing>, u64)> {
        self.tick();
        self.inner.list(page).await
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Patient>> {
        self.tick();
        self.inner.find_by_id(id).await
    }

    async fn update(&self, id: Uuid, changes: &PatientChanges) -> anyhow::Result<Option<Patient>> {
        self.tick();
        self.inner.update(id, changes).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.tick();
        self.inner.delete(id).await
    }
}

fn patient_payload() -> Value {
    json!({
        "full_name": "John Doe",
        "date_of_birth": "1985-07-20",
        "gender": "male",
        "address": "12 Elm Rd",
        "phone": "555-0101",
        "email": "john@mail.com",
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_router();
    let (status, body) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_register_login_and_duplicates() {
    let app = test_router();

    let registration = json!({
        "username": "dr1",
        "password": "pw1",
        "email": "dr1@x.com",
        "full_name": "Dr One",
        "user_type": "doctor",
    });
    let (status, body) = send(&app, "POST", "/register", None, Some(registration.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");
    assert!(body["user_id"].is_string());

    let (status, body) = send(&app, "POST", "/register", None, Some(registration)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already exists");

    let (status, body) = send(
        &app,
        "POST",
        "/login",
        None,
        Some(json!({ "username": "dr1", "password": "pw1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user_type"], "doctor");
    assert!(!body["access_token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_register_rejects_bad_payloads() {
    let app = test_router();

    let (status, body) = send(&app, "POST", "/register", None, Some(json!({ "username": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request payload");

    let (status, _) = send(
        &app,
        "POST",
        "/register",
        None,
        Some(json!({
            "username": "nurse1",
            "password": "pw1",
            "email": "nurse1@x.com",
            "user_type": "nurse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/register",
        None,
        Some(json!({
            "username": "dr9",
            "password": "pw1",
            "email": "no-at-sign",
            "full_name": "Dr Nine",
            "user_type": "doctor",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_requires_full_name() {
    let app = test_router();
    let mut registration = json!({
        "username": "dr1",
        "password": "pw1",
        "email": "dr1@x.com",
        "user_type": "doctor",
    });

    let (status, body) = send(&app, "POST", "/register", None, Some(registration.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Full name is required");

    registration["full_name"] = json!("   ");
    let (status, body) = send(&app, "POST", "/register", None, Some(registration.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Full name is required");

    // Nothing was stored, so the same identity can still register
    registration["full_name"] = json!("Dr One");
    let (status, _) = send(&app, "POST", "/register", None, Some(registration)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_login_failures_share_one_response() {
    let app = test_router();
    register_and_login(&app, "dr1", "doctor").await;

    let (status_a, body_a) = send(
        &app,
        "POST",
        "/login",
        None,
        Some(json!({ "username": "dr1", "password": "wrong" })),
    )
    .await;
    let (status_b, body_b) = send(
        &app,
        "POST",
        "/login",
        None,
        Some(json!({ "username": "nobody", "password": "pw1" })),
    )
    .await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a, body_b);
    assert_eq!(body_a["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_role_gate_and_logout_scenario() {
    let app = test_router();
    let doctor = register_and_login(&app, "dr1", "doctor").await;
    let receptionist = register_and_login(&app, "rc1", "receptionist").await;

    // Doctor cannot create
    let (status, body) = send(&app, "POST", "/patients", Some(doctor.as_str()), Some(patient_payload())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    // Receptionist can
    let (status, body) = send(
        &app,
        "POST",
        "/patients",
        Some(receptionist.as_str()),
        Some(patient_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Patient created successfully");

    // Logout, then the same token is refused
    let (status, body) = send(&app, "POST", "/logout", Some(receptionist.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully logged out");

    let (status, body) = send(
        &app,
        "POST",
        "/patients",
        Some(receptionist.as_str()),
        Some(patient_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token has been invalidated");

    // Logging out twice is refused too, since the token is already revoked
    let (status, _) = send(&app, "POST", "/logout", Some(receptionist.as_str()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other sessions are unaffected
    let (status, _) = send(&app, "GET", "/patients", Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_malformed_authorization() {
    let app = test_router();

    let (status, body) = send(&app, "GET", "/patients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid authorization header");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/patients")
                .header(header::AUTHORIZATION, "Token abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/patients", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Signed with a different secret
    let foreign = JwtHandler::new(b"someone-else", chrono::Duration::hours(1))
        .issue(uuid::Uuid::new_v4(), clinic_backend::auth::Role::Doctor, chrono::Utc::now())
        .unwrap();
    let (status, _) = send(&app, "GET", "/patients", Some(foreign.token.as_str()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_patient_crud_with_disjoint_updates() {
    let app = test_router();
    let doctor = register_and_login(&app, "dr1", "doctor").await;
    let receptionist = register_and_login(&app, "rc1", "receptionist").await;

    let (_, created) = send(
        &app,
        "POST",
        "/patients",
        Some(receptionist.as_str()),
        Some(patient_payload()),
    )
    .await;
    let id = created["patient_id"].as_str().unwrap().to_string();

    // Anyone authenticated can read
    let (status, patient) = send(&app, "GET", &format!("/patients/{id}"), Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patient["full_name"], "John Doe");
    assert_eq!(patient["date_of_birth"], "1985-07-20");

    // Listing carries the registering user
    let (status, list) = send(&app, "GET", "/patients?page=1&page_size=5", Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["page_size"], 5);
    assert_eq!(list["patients"][0]["registered_by_user"]["full_name"], "rc1 full");

    // Doctor: medical history only, via PATCH
    let (status, patient) = send(
        &app,
        "PATCH",
        &format!("/patients/{id}"),
        Some(doctor.as_str()),
        Some(json!({ "medical_history": "asthma" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patient["medical_history"], "asthma");
    assert_eq!(patient["phone"], "555-0101");

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/patients/{id}"),
        Some(doctor.as_str()),
        Some(json!({ "phone": "000" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/patients/{id}"),
        Some(doctor.as_str()),
        Some(json!({ "phone": "000" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Receptionist: demographics only, via PUT
    let (status, patient) = send(
        &app,
        "PUT",
        &format!("/patients/{id}"),
        Some(receptionist.as_str()),
        Some(json!({ "phone": "555-0199" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patient["phone"], "555-0199");
    assert_eq!(patient["medical_history"], "asthma");

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/patients/{id}"),
        Some(receptionist.as_str()),
        Some(json!({ "medical_history": "none" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/patients/{id}"),
        Some(receptionist.as_str()),
        Some(json!({ "medical_history": "none" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Doctor cannot delete; receptionist can, once
    let (status, _) = send(&app, "DELETE", &format!("/patients/{id}"), Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "DELETE", &format!("/patients/{id}"), Some(receptionist.as_str()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = send(&app, "DELETE", &format!("/patients/{id}"), Some(receptionist.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Patient not found");

    let (status, _) = send(&app, "GET", &format!("/patients/{id}"), Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patient_validation() {
    let app = test_router();
    let receptionist = register_and_login(&app, "rc1", "receptionist").await;

    let mut bad_date = patient_payload();
    bad_date["date_of_birth"] = json!("20/07/1985");
    let (status, body) = send(&app, "POST", "/patients", Some(receptionist.as_str()), Some(bad_date)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid date format. Use YYYY-MM-DD");

    let mut future = patient_payload();
    future["date_of_birth"] = json!("2999-01-01");
    let (status, _) = send(&app, "POST", "/patients", Some(receptionist.as_str()), Some(future)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_gender = patient_payload();
    bad_gender["gender"] = json!("unknown");
    let (status, _) = send(&app, "POST", "/patients", Some(receptionist.as_str()), Some(bad_gender)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/patients/not-a-uuid", Some(receptionist.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid patient ID");
}

#[tokio::test]
async fn test_profile_read_and_update() {
    let app = test_router();
    let doctor = register_and_login(&app, "dr1", "doctor").await;
    register_and_login(&app, "dr2", "doctor").await;

    let (status, me) = send(&app, "GET", "/me", Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "dr1");
    assert_eq!(me["user_type"], "doctor");
    assert!(me.get("password_hash").is_none());

    let (status, me) = send(
        &app,
        "PATCH",
        "/me",
        Some(doctor.as_str()),
        Some(json!({ "full_name": "Dr. One" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["full_name"], "Dr. One");

    let (status, body) = send(
        &app,
        "PATCH",
        "/me",
        Some(doctor.as_str()),
        Some(json!({ "email": "dr2@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already exists");
}

#[tokio::test]
async fn test_denylist_failure_is_server_error() {
    let mut repos = Repositories::in_memory();
    repos.tokens = Arc::new(BrokenDenylist);
    let app = router(test_state_with(repos), Duration::from_secs(60));
    let doctor = register_and_login(&app, "dr1", "doctor").await;

    // A valid token must not slip through when revocation can't be checked
    let (status, body) = send(&app, "GET", "/patients", Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Internal server error" }));

    let (status, body) = send(&app, "POST", "/logout", Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");
}

#[tokio::test]
async fn test_role_gate_rejects_before_patient_store() {
    let mut repos = Repositories::in_memory();
    let patients = Arc::new(CountingPatients {
        inner: repos.patients.clone(),
        calls: AtomicUsize::new(0),
    });
    repos.patients = patients.clone();
    let app = router(test_state_with(repos), Duration::from_secs(60));
    let doctor = register_and_login(&app, "dr1", "doctor").await;
    let receptionist = register_and_login(&app, "rc1", "receptionist").await;

    let (status, _) = send(&app, "POST", "/patients", Some(doctor.as_str()), Some(patient_payload())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let target = format!("/patients/{}", Uuid::new_v4());
    let (status, _) = send(&app, "PUT", &target, Some(doctor.as_str()), Some(json!({ "phone": "1" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "DELETE", &target, Some(doctor.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        "PATCH",
        &target,
        Some(receptionist.as_str()),
        Some(json!({ "medical_history": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(patients.calls(), 0);

    let (status, _) = send(
        &app,
        "POST",
        "/patients",
        Some(receptionist.as_str()),
        Some(patient_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(patients.calls(), 1);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = test_router();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers().get("x-request-id").unwrap();
    assert!(Uuid::parse_str(generated.to_str().unwrap()).is_ok());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "front-desk-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "front-desk-42");
}
