pub mod utils;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{
    api::models::{health::HealthResponse, posts::PostResponse, users::UserResponse},
    auth::token::AuthClaims,
    config::{EmailConfig, EmailTransportConfig},
    email::{EmailService, Mailer},
    errors::BASIC_AUTH_CHALLENGE,
    test_utils::{OPS_PASSWORD, OPS_USERNAME, RecordingMailer, basic, bearer},
};
use utils::{spawn_app, spawn_app_with};

/// A user registers, activates once, and logs in with a token naming them
#[test_log::test(tokio::test)]
async fn test_register_activate_login() {
    let app = spawn_app();

    let registration = app.register("alice", "alice@x.com", "pw123").await;
    assert_eq!(registration.user.username, "alice");
    assert!(!registration.user.is_active);
    assert_eq!(registration.user.role.name, "user");

    app.server
        .put(&format!("/v1/users/activate/{}", registration.token))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    // Single use
    app.server
        .put(&format!("/v1/users/activate/{}", registration.token))
        .await
        .assert_status_not_found();

    let token = app.login("alice@x.com", "pw123").await;
    let claims = app.state.authenticator.validate_token(&token).unwrap();
    assert_eq!(claims.sub, registration.user.id);
    assert_eq!(claims.iss, "authgate");
}

#[test_log::test(tokio::test)]
async fn test_registration_response_never_leaks_secrets() {
    let app = spawn_app();

    let response = app
        .server
        .post("/v1/authentication/user")
        .json(&json!({ "username": "alice", "email": "alice@x.com", "password": "pw123" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body = response.text();
    assert!(!body.contains("pw123"));
    assert!(!body.contains("password"));
    assert!(!body.contains("argon2"));
}

#[test_log::test(tokio::test)]
async fn test_duplicate_email_is_rejected() {
    let app = spawn_app();
    app.register("alice", "alice@x.com", "pw123").await;

    let response = app
        .server
        .post("/v1/authentication/user")
        .json(&json!({ "username": "alice2", "email": "alice@x.com", "password": "pw123" }))
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("email"));

    assert_eq!(app.store.user_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_invalid_registration_payload() {
    let app = spawn_app();

    for payload in [
        json!({ "username": "", "email": "alice@x.com", "password": "pw123" }),
        json!({ "username": "alice", "email": "not-an-email", "password": "pw123" }),
        json!({ "username": "alice", "email": "alice@x.com", "password": "pw" }),
    ] {
        app.server
            .post("/v1/authentication/user")
            .json(&payload)
            .await
            .assert_status_bad_request();
    }

    assert_eq!(app.store.user_count(), 0);
    assert!(app.mailer.sent().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_malformed_bodies_are_bad_request() {
    let app = spawn_app();

    for (path, payload) in [
        ("/v1/authentication/user", json!({ "username": "alice", "email": "alice@x.com" })),
        ("/v1/authentication/user", json!({ "username": 7, "email": "alice@x.com", "password": "pw123" })),
        ("/v1/authentication/token", json!({ "email": "alice@x.com" })),
    ] {
        let response = app.server.post(path).json(&payload).await;
        response.assert_status_bad_request();
        let body: Value = response.json();
        assert!(body["error"].is_string(), "{path} answered {body}");
    }

    let response = app
        .server
        .post("/v1/authentication/user")
        .text("{\"username\": ")
        .content_type("application/json")
        .await;
    response.assert_status_bad_request();

    assert_eq!(app.store.user_count(), 0);
}

/// Usernames are free text; the welcome email must still go out through the real mailer
#[test_log::test(tokio::test)]
async fn test_registration_mails_users_with_unusual_names() {
    let dir = tempfile::tempdir().unwrap();
    let email_config = EmailConfig {
        transport: EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        },
        ..Default::default()
    };
    let mailer: Arc<dyn Mailer> = Arc::new(EmailService::new(&email_config).unwrap());
    let app = spawn_app_with(Arc::new(RecordingMailer::default()), |state| state.mailer = mailer);

    for (i, username) in ["alice@home", "bob (dev)", "a,b", r#"x"y"#].into_iter().enumerate() {
        app.register(username, &format!("user{i}@x.com"), "pw123").await;
    }

    assert_eq!(app.store.user_count(), 4);
    assert_eq!(app.store.invitation_count(), 4);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
}

#[test_log::test(tokio::test)]
async fn test_mail_failure_rolls_back_registration() {
    let app = spawn_app_with(Arc::new(RecordingMailer::failing()), |_| {});

    let response = app
        .server
        .post("/v1/authentication/user")
        .json(&json!({ "username": "alice", "email": "alice@x.com", "password": "pw123" }))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(app.store.user_count(), 0);
    assert_eq!(app.store.invitation_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_expired_invitation_is_rejected() {
    let app = spawn_app();
    let registration = app.register("alice", "alice@x.com", "pw123").await;

    let digest = crate::auth::password::digest_token(&registration.token);
    app.store.set_invitation_expiry(&digest, Utc::now() - chrono::Duration::minutes(1));

    app.server
        .put(&format!("/v1/users/activate/{}", registration.token))
        .await
        .assert_status_bad_request();
}

#[test_log::test(tokio::test)]
async fn test_login_failures_are_indistinguishable() {
    let app = spawn_app();
    app.register("alice", "alice@x.com", "pw123").await;

    let unknown = app
        .server
        .post("/v1/authentication/token")
        .json(&json!({ "email": "nobody@x.com", "password": "pw123" }))
        .await;
    let wrong = app
        .server
        .post("/v1/authentication/token")
        .json(&json!({ "email": "alice@x.com", "password": "wrong" }))
        .await;

    unknown.assert_status_unauthorized();
    wrong.assert_status_unauthorized();
    assert_eq!(unknown.text(), wrong.text());
}

#[test_log::test(tokio::test)]
async fn test_login_activation_gate_is_configurable() {
    // Off by default: an inactive user may log in
    let app = spawn_app();
    app.register("alice", "alice@x.com", "pw123").await;
    app.login("alice@x.com", "pw123").await;

    let app = spawn_app_with(Arc::new(RecordingMailer::default()), |state| {
        state.config.auth.require_activation_for_login = true;
    });
    let registration = app.register("alice", "alice@x.com", "pw123").await;

    let before = app
        .server
        .post("/v1/authentication/token")
        .json(&json!({ "email": "alice@x.com", "password": "pw123" }))
        .await;
    before.assert_status_unauthorized();
    let wrong = app
        .server
        .post("/v1/authentication/token")
        .json(&json!({ "email": "alice@x.com", "password": "wrong" }))
        .await;
    assert_eq!(before.text(), wrong.text());

    app.server
        .put(&format!("/v1/users/activate/{}", registration.token))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.login("alice@x.com", "pw123").await;
}

#[test_log::test(tokio::test)]
async fn test_health_requires_operator_credentials() {
    let app = spawn_app();

    let response = app.server.get("/v1/health").await;
    response.assert_status_unauthorized();
    assert_eq!(response.header("www-authenticate"), BASIC_AUTH_CHALLENGE);

    let response = app
        .server
        .get("/v1/health")
        .add_header("authorization", basic(OPS_USERNAME, "wrong"))
        .await;
    response.assert_status_unauthorized();
    assert_eq!(response.header("www-authenticate"), BASIC_AUTH_CHALLENGE);

    let response = app
        .server
        .get("/v1/health")
        .add_header("authorization", basic(OPS_USERNAME, OPS_PASSWORD))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<HealthResponse>().status, "ok");
}

#[test_log::test(tokio::test)]
async fn test_bearer_token_does_not_open_operational_routes() {
    let app = spawn_app();
    let (_, auth) = app.user_with_role("root", "admin");

    app.server
        .get("/v1/health")
        .add_header("authorization", auth)
        .await
        .assert_status_unauthorized();
}

#[test_log::test(tokio::test)]
async fn test_tampered_token_is_rejected() {
    let app = spawn_app();
    let (id, _) = app.signed_in_user("alice").await;
    let token = app.login("alice@x.com", "pw123").await;

    // Flip one character inside the signature
    let mut bytes = token.clone().into_bytes();
    let i = bytes.len() - 5;
    bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(bytes).unwrap();

    app.server
        .get(&format!("/v1/users/{id}"))
        .add_header("authorization", bearer(&tampered))
        .await
        .assert_status_unauthorized();
    app.server
        .get(&format!("/v1/users/{id}"))
        .add_header("authorization", bearer(&token))
        .await
        .assert_status_ok();
}

#[test_log::test(tokio::test)]
async fn test_token_claims_are_checked() {
    let app = spawn_app();
    let (id, _) = app.signed_in_user("alice").await;
    let config = &app.state.config.auth.token;

    let expired = AuthClaims::new(id, config, Utc::now() - chrono::Duration::days(30));
    let future = AuthClaims::new(id, config, Utc::now() + chrono::Duration::hours(1));
    let wrong_issuer = AuthClaims {
        iss: "someone-else".to_string(),
        ..AuthClaims::new(id, config, Utc::now())
    };
    let wrong_audience = AuthClaims {
        aud: "someone-else".to_string(),
        ..AuthClaims::new(id, config, Utc::now())
    };

    let mut bodies = Vec::new();
    for claims in [expired, future, wrong_issuer, wrong_audience] {
        let token = app.state.authenticator.generate_token(&claims).unwrap();
        let response = app
            .server
            .get(&format!("/v1/users/{id}"))
            .add_header("authorization", bearer(&token))
            .await;
        response.assert_status_unauthorized();
        bodies.push(response.text());
    }
    // Callers cannot tell which check failed
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test_log::test(tokio::test)]
async fn test_deleted_user_token_is_rejected() {
    let app = spawn_app_with(Arc::new(RecordingMailer::default()), |state| state.cache = None);
    let (id, auth) = app.user_with_role("alice", "user");

    app.server
        .get(&format!("/v1/users/{id}"))
        .add_header("authorization", auth.clone())
        .await
        .assert_status_ok();

    crate::db::UserStore::delete(app.store.as_ref(), id).await.unwrap();

    app.server
        .get(&format!("/v1/users/{id}"))
        .add_header("authorization", auth)
        .await
        .assert_status_unauthorized();
}

#[test_log::test(tokio::test)]
async fn test_principal_cache_spares_the_store() {
    let app = spawn_app();
    let (id, auth) = app.user_with_role("alice", "user");

    // Create-post never reads users itself, so every lookup below comes from the Bearer gate
    for _ in 0..3 {
        app.server
            .post("/v1/posts")
            .add_header("authorization", auth.clone())
            .json(&json!({ "title": "hello", "content": "world" }))
            .await
            .assert_status(StatusCode::CREATED);
    }
    assert_eq!(app.store.user_lookups(), 1);

    let cached = app.state.cache.as_ref().unwrap().get(id).await.unwrap().unwrap();
    assert_eq!(cached.username, "alice");
}

#[test_log::test(tokio::test)]
async fn test_without_cache_every_request_reads_the_store() {
    let app = spawn_app_with(Arc::new(RecordingMailer::default()), |state| state.cache = None);
    let (_, auth) = app.user_with_role("alice", "user");

    for _ in 0..3 {
        app.server
            .post("/v1/posts")
            .add_header("authorization", auth.clone())
            .json(&json!({ "title": "hello", "content": "world" }))
            .await
            .assert_status(StatusCode::CREATED);
    }
    assert_eq!(app.store.user_lookups(), 3);
}

#[test_log::test(tokio::test)]
async fn test_get_user() {
    let app = spawn_app();
    let (id, auth) = app.user_with_role("alice", "user");

    let response = app
        .server
        .get(&format!("/v1/users/{id}"))
        .add_header("authorization", auth.clone())
        .await;
    response.assert_status_ok();
    let user: UserResponse = response.json();
    assert_eq!(user.id, id);
    assert_eq!(user.role.level, 1);

    app.server
        .get(&format!("/v1/users/{}", uuid::Uuid::new_v4()))
        .add_header("authorization", auth)
        .await
        .assert_status_not_found();

    app.server.get(&format!("/v1/users/{id}")).await.assert_status_unauthorized();
}

/// Ownership and role level together decide who may edit and delete a post
#[test_log::test(tokio::test)]
async fn test_ownership_gate() {
    let app = spawn_app();
    let (_, owner) = app.user_with_role("owner", "user");
    let (_, stranger) = app.user_with_role("stranger", "user");
    let (_, moderator) = app.user_with_role("mod", "moderator");
    let (_, admin) = app.user_with_role("root", "admin");

    let post: PostResponse = app
        .server
        .post("/v1/posts")
        .add_header("authorization", owner.clone())
        .json(&json!({ "title": "mine", "content": "body", "tags": ["a"] }))
        .await
        .json();
    let path = format!("/v1/posts/{}", post.id);

    // Anyone authenticated may read
    app.server
        .get(&path)
        .add_header("authorization", stranger.clone())
        .await
        .assert_status_ok();

    // Update needs moderator; the owner qualifies through ownership
    app.server
        .patch(&path)
        .add_header("authorization", stranger.clone())
        .json(&json!({ "title": "hijacked" }))
        .await
        .assert_status_forbidden();
    let updated: PostResponse = app
        .server
        .patch(&path)
        .add_header("authorization", owner.clone())
        .json(&json!({ "title": "edited" }))
        .await
        .json();
    assert_eq!(updated.title, "edited");
    assert_eq!(updated.content, "body");
    app.server
        .patch(&path)
        .add_header("authorization", moderator.clone())
        .json(&json!({ "content": "moderated" }))
        .await
        .assert_status_ok();

    // Delete needs admin; ownership is not enough
    app.server
        .delete(&path)
        .add_header("authorization", owner)
        .await
        .assert_status_forbidden();
    app.server
        .delete(&path)
        .add_header("authorization", moderator)
        .await
        .assert_status_forbidden();
    app.server
        .delete(&path)
        .add_header("authorization", admin.clone())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .get(&path)
        .add_header("authorization", admin)
        .await
        .assert_status_not_found();
}

#[test_log::test(tokio::test)]
async fn test_missing_post_is_not_found_before_gate() {
    let app = spawn_app();
    let (_, auth) = app.user_with_role("alice", "user");

    app.server
        .delete(&format!("/v1/posts/{}", uuid::Uuid::new_v4()))
        .add_header("authorization", auth)
        .await
        .assert_status_not_found();
}

#[test_log::test(tokio::test)]
async fn test_openapi_document_is_public() {
    let app = spawn_app();

    let response = app.server.get("/v1/openapi.json").await;
    response.assert_status_ok();
    let doc: Value = response.json();
    assert!(doc["paths"]["/authentication/token"].is_object());
}

#[test_log::test(tokio::test)]
async fn test_cors_allows_only_the_frontend_origin() {
    let app = spawn_app();
    let frontend = app.state.config.frontend_url.clone();

    let response = app.server.get("/v1/openapi.json").add_header("origin", frontend.clone()).await;
    response.assert_status_ok();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        frontend.as_str()
    );

    let response = app
        .server
        .get("/v1/openapi.json")
        .add_header("origin", "https://elsewhere.example")
        .await;
    assert!(response.headers().get("access-control-allow-origin").is_none());

    // Preflight for an authenticated call
    let response = app
        .server
        .method(axum::http::Method::OPTIONS, "/v1/posts")
        .add_header("origin", frontend.clone())
        .add_header("access-control-request-method", "POST")
        .add_header("access-control-request-headers", "authorization,content-type")
        .await;
    response.assert_status_ok();
    let allowed_headers = response
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed_headers.contains("authorization"));
}
