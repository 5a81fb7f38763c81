//! Shared fixtures for the HTTP integration tests
//!
//! Builds the real router over a [`MemoryStore`], seeds accounts directly in
//! the store and mints tokens for them, then drives requests through
//! `tower::Service::call`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use kinship_api::app::{build_router, AppState};
use kinship_api::config::Config;
use kinship_shared::auth::jwt::{create_token, Claims};
use kinship_shared::models::family::{CreateFamily, Family};
use kinship_shared::models::user::{CreateUser, FamilyRole, User};
use kinship_shared::store::{Directory, MemoryStore};
use serde_json::Value;
use tower::Service as _;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub app: axum::Router,
    pub config: Config,
}

/// A seeded account with a valid access token
#[derive(Debug, Clone)]
pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    /// The stable error code of an error body
    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = Config::for_memory(TEST_SECRET);
        let app = build_router(AppState::new(store.clone(), config.clone()));

        Self { store, app, config }
    }

    /// Seeds a user without a family. The password hash is never checked.
    pub async fn user(&self, first_name: &str, last_name: &str) -> TestUser {
        let user = self
            .store
            .create_user(CreateUser {
                email: format!("{}-{}@example.com", first_name.to_lowercase(), Uuid::new_v4()),
                password_hash: "unused".to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                second_last_name: None,
                role: FamilyRole::Other,
            })
            .await
            .unwrap();

        let token = self.token_for(&user);
        TestUser { user, token }
    }

    /// Seeds a family owned by `owner`, who is attached to it.
    pub async fn family(&self, owner: &TestUser, name: &str) -> Family {
        self.store
            .create_family(CreateFamily {
                name: name.to_string(),
                owner_id: owner.id(),
            })
            .await
            .unwrap()
    }

    /// Seeds a family with `owner` and attaches every member to it.
    pub async fn family_with(&self, owner: &TestUser, name: &str, members: &[&TestUser]) -> Family {
        let family = self.family(owner, name).await;
        for member in members {
            assert!(self.store.set_user_family(member.id(), Some(family.id)).await.unwrap());
        }
        family
    }

    pub async fn reload(&self, user: &TestUser) -> User {
        self.store.find_user_by_id(user.id()).await.unwrap().unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        let claims = Claims::new(user.id, user.email.clone(), Duration::hours(1));
        create_token(&claims, &self.config.jwt.secret).unwrap()
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        Reply { status, body }
    }

    pub async fn get(&self, uri: &str, as_user: &TestUser) -> Reply {
        self.send("GET", uri, Some(&as_user.token), None).await
    }

    pub async fn post(&self, uri: &str, as_user: &TestUser, body: Value) -> Reply {
        self.send("POST", uri, Some(&as_user.token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, as_user: &TestUser, body: Option<Value>) -> Reply {
        self.send("PUT", uri, Some(&as_user.token), body).await
    }

    pub async fn delete(&self, uri: &str, as_user: &TestUser) -> Reply {
        self.send("DELETE", uri, Some(&as_user.token), None).await
    }
}
