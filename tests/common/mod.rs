#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use inkpress::{
    config::Config,
    routes,
    services::{auth::{Claims, User}, Database},
    state::AppState,
    utils::clock::ManualClock,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        username: Some(id.to_string()),
        display_name: None,
        roles: vec!["user".to_string()],
    }
}

pub fn admin(id: &str) -> User {
    User {
        roles: vec!["admin".to_string()],
        ..user(id)
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_database(Database::memory())
    }

    pub fn with_database(db: Database) -> Self {
        Self::with_clock(db, Arc::new(ManualClock::default()))
    }

    pub fn with_clock(db: Database, clock: Arc<ManualClock>) -> Self {
        let state = Arc::new(AppState::with_clock(Config::default(), db, clock.clone()));
        let router = routes::build_router(state.clone());
        Self { state, clock, router }
    }

    pub fn token(&self, user_id: &str, roles: &[&str]) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + 3600,
            iat: now,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            username: Some(user_id.to_string()),
            display_name: Some(format!("{} (display)", user_id)),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.state.config.jwt_secret.as_bytes()),
        )
        .unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// Sends `body` verbatim as `application/json`, parseable or not.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &'static str,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
