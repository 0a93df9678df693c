//! Test utilities for integration testing (available with `test-utils` feature).

use axum_test::TestServer;
use base64::{Engine as _, engine::general_purpose};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    AppState,
    auth::token::JwtAuthenticator,
    cache::MokaPrincipalCache,
    config::{BasicAuthConfig, CacheConfig, Config, EmailConfig, EmailTransportConfig, PasswordConfig},
    db::memory::MemoryStore,
    email::{Delivery, EmailTemplate, Mailer, Recipient},
    errors::Error,
};

pub const OPS_USERNAME: &str = "ops";
pub const OPS_PASSWORD: &str = "ops-secret";

pub fn create_test_config() -> Config {
    // Use temp directory for test emails
    let temp_dir = std::env::temp_dir().join(format!("authgate-test-emails-{}", std::process::id()));

    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: "http://localhost:5173".to_string(),
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: temp_dir.to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        cache: CacheConfig {
            enabled: true,
            ttl: Duration::from_secs(60),
            ..Default::default()
        },
        ..Default::default()
    };
    config.auth.basic = BasicAuthConfig {
        username: OPS_USERNAME.to_string(),
        password: OPS_PASSWORD.to_string(),
    };
    config.auth.token.secret = Some("test-secret-key-for-testing-only".to_string());
    // Fast hashing for tests
    config.auth.password = PasswordConfig {
        argon2_memory_kib: 128,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..Default::default()
    };
    config
}

/// An email captured by [`RecordingMailer`]
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub template: EmailTemplate,
    pub recipient: Recipient,
}

/// Mailer that records messages instead of sending them, or fails every send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, template: &EmailTemplate, recipient: &Recipient) -> Result<Delivery, Error> {
        if self.fail {
            return Err(Error::Internal {
                operation: "send file email: mailbox unavailable".to_string(),
            });
        }
        self.sent.lock().expect("mailer lock poisoned").push(SentEmail {
            template: template.clone(),
            recipient: recipient.clone(),
        });
        Ok(Delivery {
            transport: "recording",
            status: None,
        })
    }
}

/// Application state over an in-memory store with a real JWT authenticator and an in-process cache.
pub fn create_test_state(store: Arc<MemoryStore>, mailer: Arc<RecordingMailer>) -> AppState {
    let config = create_test_config();
    let authenticator = JwtAuthenticator::new(&config.auth.token).expect("test config has a token secret");
    let cache = MokaPrincipalCache::new(&config.cache);

    AppState::builder()
        .users(store.clone())
        .roles(store.clone())
        .posts(store)
        .cache(Arc::new(cache))
        .authenticator(Arc::new(authenticator))
        .mailer(mailer)
        .config(config)
        .build()
}

pub fn create_test_server(state: AppState) -> TestServer {
    crate::Application::from_state(state)
        .expect("Failed to build router")
        .into_test_server()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", general_purpose::STANDARD.encode(format!("{username}:{password}")))
}
