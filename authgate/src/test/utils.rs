//! Helpers for driving the router end to end.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use std::sync::Arc;

use crate::{
    AppState,
    api::models::auth::{RegisterResponse, TokenResponse},
    db::memory::MemoryStore,
    test_utils::{RecordingMailer, bearer, create_test_server, create_test_state},
};

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(RecordingMailer::default()), |_| {})
}

pub fn spawn_app_with(mailer: Arc<RecordingMailer>, customize: impl FnOnce(&mut AppState)) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mut state = create_test_state(store.clone(), mailer.clone());
    customize(&mut state);

    TestApp {
        server: create_test_server(state.clone()),
        state,
        store,
        mailer,
    }
}

impl TestApp {
    pub async fn register(&self, username: &str, email: &str, password: &str) -> RegisterResponse {
        let response = self
            .server
            .post("/v1/authentication/user")
            .json(&json!({ "username": username, "email": email, "password": password }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<RegisterResponse>()
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .server
            .post("/v1/authentication/token")
            .json(&json!({ "email": email, "password": password }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<TokenResponse>().token
    }

    /// Register, activate and log in; returns the user id and a bearer header value.
    pub async fn signed_in_user(&self, username: &str) -> (uuid::Uuid, String) {
        let email = format!("{username}@x.com");
        let registration = self.register(username, &email, "pw123").await;
        self.server
            .put(&format!("/v1/users/activate/{}", registration.token))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let token = self.login(&email, "pw123").await;
        (registration.user.id, bearer(&token))
    }

    /// An active user with the given role and a bearer header value for them.
    pub fn user_with_role(&self, username: &str, role: &str) -> (uuid::Uuid, String) {
        let user = self.store.insert_active_user(username, &format!("{username}@x.com"), "unused", role);
        let claims = crate::auth::token::AuthClaims::new(user.id, &self.state.config.auth.token, chrono::Utc::now());
        let token = self.state.authenticator.generate_token(&claims).unwrap();
        (user.id, bearer(&token))
    }
}
