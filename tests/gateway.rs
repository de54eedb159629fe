//! Router-level tests: the rate limiter and the access guards as a client sees them.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, Response, StatusCode, header},
    middleware::{from_fn, from_fn_with_state},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use helper_gateway::access::{
    BearerAuth, Claims, Principal, Role, USER_ID_HEADER, USER_ROLE_HEADER, bearer_auth, identity_headers,
};
use helper_gateway::error::StoreError;
use helper_gateway::rate_limit::{
    FailurePolicy, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, RateLimitConfig,
};
use helper_gateway::router;
use helper_gateway::state::AppState;
use helper_gateway::store::{MemoryStore, SharedStore};

fn app_with(store: Arc<dyn SharedStore>, config: RateLimitConfig) -> Router {
    let state = Arc::new(AppState::new(
        store,
        config,
        Duration::from_secs(300),
        Duration::from_secs(3600),
    ));
    router(state).layer(from_fn(identity_headers))
}

fn app(limit: u64) -> Router {
    let config = RateLimitConfig::new(limit, Duration::from_secs(60)).unwrap();
    app_with(Arc::new(MemoryStore::new()), config)
}

struct Call {
    method: Method,
    uri: String,
    ip: &'static str,
    caller: Option<(i64, &'static str)>,
    token: Option<String>,
    body: Option<Value>,
}

impl Call {
    fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            ip: "10.0.0.1",
            caller: None,
            token: None,
            body: None,
        }
    }

    fn from_ip(mut self, ip: &'static str) -> Self {
        self.ip = ip;
        self
    }

    fn as_user(mut self, id: i64, role: &'static str) -> Self {
        self.caller = Some((id, role));
        self
    }

    fn bearer(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    async fn send(self, app: &Router) -> Response<Body> {
        let addr: SocketAddr = format!("{}:40000", self.ip).parse().unwrap();
        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.uri)
            .extension(ConnectInfo(addr));
        if let Some((id, role)) = self.caller {
            builder = builder
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, role);
        }
        if let Some(token) = self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match self.body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn remaining(response: &Response<Body>) -> u64 {
    response.headers()[HEADER_REMAINING]
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn fixed_window_over_http() {
    let app = app(3);
    let call = || Call::new(Method::GET, "/api/v1/permissions").from_ip("1.2.3.4").as_user(9, "user");

    for expected in [2, 1, 0] {
        let response = call().send(&app).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_LIMIT], "3");
        let reset: i64 = response.headers()[HEADER_RESET].to_str().unwrap().parse().unwrap();
        let now = chrono::Utc::now().timestamp();
        assert!((reset - (now + 60)).abs() <= 1, "reset {reset} vs now {now}");
        assert_eq!(remaining(&response), expected);
    }

    let rejected = call().send(&app).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(remaining(&rejected), 0);
    let body = body_json(rejected).await;
    assert_eq!(body["error"], "Too many requests");
    assert_eq!(body["limit"], 3);
    assert_eq!(body["window_seconds"], 60);

    // a different client has its own window
    let other = call().from_ip("5.6.7.8").send(&app).await;
    assert_eq!(other.status(), StatusCode::OK);

    tokio::time::advance(Duration::from_secs(61)).await;

    let fresh = call().send(&app).await;
    assert_eq!(fresh.status(), StatusCode::OK);
    assert_eq!(remaining(&fresh), 2);
}

#[tokio::test]
async fn whitelisted_requests_skip_the_limiter() {
    let app = app(1);

    for _ in 0..5 {
        let health = Call::new(Method::GET, "/api/v1/health").send(&app).await;
        assert_eq!(health.status(), StatusCode::OK);
        assert!(!health.headers().contains_key(HEADER_REMAINING));

        let local = Call::new(Method::GET, "/api/v1/password-policy")
            .from_ip("127.0.0.1")
            .send(&app)
            .await;
        assert_eq!(local.status(), StatusCode::OK);
        assert!(!local.headers().contains_key(HEADER_LIMIT));
    }

    // none of the above used up 10.0.0.1's single request
    let counted = Call::new(Method::GET, "/api/v1/password-policy").send(&app).await;
    assert_eq!(counted.status(), StatusCode::OK);
    assert_eq!(remaining(&counted), 0);
}

#[tokio::test]
async fn unknown_routes_are_still_counted() {
    let app = app(10);
    let response = Call::new(Method::GET, "/nope").send(&app).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(remaining(&response), 9);
}

#[tokio::test]
async fn missing_principal_is_unauthorized() {
    let app = app(10);
    let response = Call::new(Method::GET, "/api/v1/permissions").send(&app).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(body_json(response).await["error"], "Unauthorized");
}

const JWT_SECRET: &str = "gateway-test-secret";

fn app_with_tokens() -> Router {
    let auth = Arc::new(BearerAuth::new(JWT_SECRET));
    app(100).layer(from_fn_with_state(auth, bearer_auth))
}

#[tokio::test]
async fn bearer_token_identifies_the_caller() {
    let app = app_with_tokens();
    let token = BearerAuth::new(JWT_SECRET)
        .issue(&Principal::new(7, Role::Helper), Duration::from_secs(900))
        .unwrap();

    let response = Call::new(Method::GET, "/api/v1/permissions")
        .bearer(token.clone())
        .send(&app)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"], "helper");

    // the verified token wins over forwarded identity headers
    let spoofed = Call::new(Method::GET, "/api/v1/permissions")
        .bearer(token)
        .as_user(1, "admin")
        .send(&app)
        .await;
    assert_eq!(body_json(spoofed).await["role"], "helper");
}

#[tokio::test]
async fn bad_bearer_tokens_are_rejected() {
    let app = app_with_tokens();
    let expired = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &Claims {
            sub: "5".to_string(),
            role: Role::User,
            exp: (chrono::Utc::now().timestamp() - 3600) as u64,
            iat: None,
        },
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    let forged = BearerAuth::new("not-the-secret")
        .issue(&Principal::new(1, Role::Admin), Duration::from_secs(900))
        .unwrap();

    // someone else's claims under a genuine signature
    let valid = BearerAuth::new(JWT_SECRET)
        .issue(&Principal::new(5, Role::User), Duration::from_secs(900))
        .unwrap();
    let valid_parts: Vec<&str> = valid.split('.').collect();
    let forged_parts: Vec<&str> = forged.split('.').collect();
    let spliced = format!("{}.{}.{}", valid_parts[0], forged_parts[1], valid_parts[2]);

    for token in [expired, forged, spliced, "garbage".to_string()] {
        let response = Call::new(Method::GET, "/api/v1/password-policy")
            .bearer(token)
            .send(&app)
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    // no token at all is anonymous, not rejected
    let open = Call::new(Method::GET, "/api/v1/password-policy").send(&app).await;
    assert_eq!(open.status(), StatusCode::OK);
}

#[tokio::test]
async fn permissions_reflect_the_callers_role() {
    let app = app(10);
    let response = Call::new(Method::GET, "/api/v1/permissions")
        .as_user(7, "helper")
        .send(&app)
        .await;
    let body = body_json(response).await;

    assert_eq!(body["role"], "helper");
    let feedback = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["resource"] == "feedback")
        .unwrap();
    assert_eq!(feedback["actions"], json!(["read"]));
}

#[tokio::test]
async fn helper_acts_for_assigned_user_only() {
    let app = app(100);

    let assigned = Call::new(Method::PUT, "/api/v1/relationships")
        .as_user(1, "admin")
        .json(json!({ "user_id": 9, "helper_id": 7, "status": "active" }))
        .send(&app)
        .await;
    assert_eq!(assigned.status(), StatusCode::OK);

    let ok = Call::new(Method::PUT, "/api/v1/users/9/tasks/3")
        .as_user(7, "helper")
        .send(&app)
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = body_json(ok).await;
    assert_eq!(body["acted_by"], 7);
    assert_eq!(body["owner_id"], 9);

    let stranger = Call::new(Method::PUT, "/api/v1/users/9/tasks/3")
        .as_user(8, "helper")
        .send(&app)
        .await;
    assert_eq!(stranger.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(stranger).await["error"], "Forbidden");

    // DELETE is outside the helper's action set, assignment or not
    let delete = Call::new(Method::DELETE, "/api/v1/users/9/recipe-requests/4")
        .as_user(7, "helper")
        .send(&app)
        .await;
    assert_eq!(delete.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn inactive_assignment_does_not_delegate() {
    let app = app(100);

    Call::new(Method::PUT, "/api/v1/relationships")
        .as_user(1, "admin")
        .json(json!({ "user_id": 9, "helper_id": 7, "status": "inactive" }))
        .send(&app)
        .await;

    let response = Call::new(Method::PUT, "/api/v1/users/9/tasks/3")
        .as_user(7, "helper")
        .send(&app)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_admins_manage_relationships() {
    let app = app(100);

    for role in ["user", "helper"] {
        let response = Call::new(Method::PUT, "/api/v1/relationships")
            .as_user(9, role)
            .json(json!({ "user_id": 9, "helper_id": 7 }))
            .send(&app)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let self_assigned = Call::new(Method::PUT, "/api/v1/relationships")
        .as_user(1, "admin")
        .json(json!({ "user_id": 9, "helper_id": 9 }))
        .send(&app)
        .await;
    assert_eq!(self_assigned.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn helper_listing_is_refreshed_after_assignment() {
    let app = app(100);
    let assign = |helper_id: i64| {
        Call::new(Method::PUT, "/api/v1/relationships")
            .as_user(1, "admin")
            .json(json!({ "user_id": 2, "helper_id": helper_id }))
    };
    let list = || Call::new(Method::GET, "/api/v1/users/2/helpers").as_user(2, "user");

    assign(10).send(&app).await;
    let first = body_json(list().send(&app).await).await;
    assert_eq!(first.as_array().unwrap().len(), 1);

    assign(11).send(&app).await;
    let second = body_json(list().send(&app).await).await;
    assert_eq!(second.as_array().unwrap().len(), 2);

    let active_only = Call::new(Method::GET, "/api/v1/users/2/helpers?status=pending")
        .as_user(2, "user")
        .send(&app)
        .await;
    assert_eq!(body_json(active_only).await, json!([]));

    let bogus = Call::new(Method::GET, "/api/v1/users/2/helpers?status=retired")
        .as_user(2, "user")
        .send(&app)
        .await;
    assert_eq!(bogus.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(bogus).await["error"], "Bad Request");
}

#[tokio::test]
async fn authorize_endpoint_reports_deny_reasons() {
    let app = app(100);
    let ask = |body: Value| Call::new(Method::POST, "/api/v1/authorize").as_user(9, "user").json(body);

    let logs = body_json(ask(json!({ "resource": "logs", "action": "read" })).send(&app).await).await;
    assert_eq!(logs["allowed"], false);
    assert_eq!(logs["reason"], "no_permission_definition");

    let relationships = body_json(
        ask(json!({ "resource": "relationships", "action": "write" }))
            .send(&app)
            .await,
    )
    .await;
    assert_eq!(relationships["reason"], "no_permission_definition");

    let delete = body_json(ask(json!({ "resource": "tasks", "action": "delete" })).send(&app).await).await;
    assert_eq!(delete["reason"], "role_not_permitted");

    let foreign = body_json(
        ask(json!({ "resource": "tasks", "action": "write", "owner_id": 10 }))
            .send(&app)
            .await,
    )
    .await;
    assert_eq!(foreign["reason"], "ownership_violation");

    let own = body_json(
        ask(json!({ "resource": "tasks", "action": "write", "owner_id": 9 }))
            .send(&app)
            .await,
    )
    .await;
    assert_eq!(own, json!({ "allowed": true }));
}

#[tokio::test]
async fn password_reset_round_trip() {
    let app = app(100);

    let denied = Call::new(Method::POST, "/api/v1/password-reset")
        .as_user(5, "user")
        .json(json!({ "user_id": 6 }))
        .send(&app)
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let issued = Call::new(Method::POST, "/api/v1/password-reset")
        .as_user(5, "user")
        .json(json!({ "user_id": 5 }))
        .send(&app)
        .await;
    assert_eq!(issued.status(), StatusCode::OK);
    let issued = body_json(issued).await;
    let token = issued["token"].as_str().unwrap().to_string();
    assert_eq!(issued["expires_in_seconds"], 3600);

    let confirm = |password: &str| {
        Call::new(Method::POST, "/api/v1/password-reset/confirm")
            .json(json!({ "token": token, "new_password": password }))
    };

    // a weak password does not use up the token
    let weak = confirm("password").send(&app).await;
    assert_eq!(weak.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!body_json(weak).await["detail"].as_array().unwrap().is_empty());

    let done = confirm("Tr0ub4dor&Zq").send(&app).await;
    assert_eq!(done.status(), StatusCode::OK);
    assert_eq!(body_json(done).await["user_id"], 5);

    let reused = confirm("Tr0ub4dor&Zq").send(&app).await;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
}

struct DownStore;

#[async_trait]
impl SharedStore for DownStore {
    async fn incr_window(&self, _: &str, _: Duration) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("timeout".into()))
    }
    async fn set(&self, _: &str, _: String, _: Option<Duration>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("timeout".into()))
    }
    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("timeout".into()))
    }
    async fn take(&self, _: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("timeout".into()))
    }
    async fn delete(&self, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("timeout".into()))
    }
    async fn delete_prefix(&self, _: &str) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("timeout".into()))
    }
}

#[tokio::test]
async fn store_outage_fails_open_by_default() {
    let app = app_with(Arc::new(DownStore), RateLimitConfig::default());

    let response = Call::new(Method::GET, "/api/v1/password-policy").send(&app).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key(HEADER_REMAINING));

    // the cache is best effort too
    let permissions = Call::new(Method::GET, "/api/v1/permissions")
        .as_user(9, "user")
        .send(&app)
        .await;
    assert_eq!(permissions.status(), StatusCode::OK);
}

#[tokio::test]
async fn store_outage_can_fail_closed() {
    let config = RateLimitConfig::default().with_failure_policy(FailurePolicy::Closed);
    let app = app_with(Arc::new(DownStore), config);

    let response = Call::new(Method::GET, "/api/v1/password-policy").send(&app).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "Rate limiter unavailable");

    // exemptions still apply, the store is never consulted for them
    let health = Call::new(Method::GET, "/ping").send(&app).await;
    assert_eq!(health.status(), StatusCode::OK);
}
