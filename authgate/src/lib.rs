//! # authgate: identity and access control
//!
//! `authgate` registers users, activates them through emailed invitation links, issues signed
//! bearer tokens, and gates routes on those tokens, on operator Basic credentials, and on role
//! level combined with resource ownership.
//!
//! ## Request flow
//!
//! Every route lives under `/v1` and falls into one of three groups:
//!
//! - **Public**: registration, activation and token issuance
//! - **Operational**: guarded by the Basic gate ([`auth::basic`])
//! - **Authenticated**: guarded by the Bearer gate ([`auth::middleware`]), which validates the
//!   token, resolves the principal through the cache-aside [`cache::PrincipalCache`], and attaches
//!   an [`auth::current_user::Principal`] to the request. Handlers that touch user-owned resources
//!   then consult [`auth::permissions`].
//!
//! ## Wiring
//!
//! Components depend on capabilities rather than concrete backends: [`db::UserStore`],
//! [`db::RoleStore`], [`db::PostStore`], [`cache::PrincipalCache`],
//! [`auth::token::TokenAuthenticator`] and [`email::Mailer`]. [`Application::new`] builds the
//! Postgres, cache, JWT and lettre implementations from a [`Config`]; tests swap in in-memory ones
//! through [`AppState`].

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
mod openapi;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod test;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{any::Any, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument};
use url::Url;
use utoipa::OpenApi;

use crate::{
    auth::{basic::basic_auth, middleware::bearer_auth, token::JwtAuthenticator, token::TokenAuthenticator},
    cache::PrincipalCache,
    config::CorsOrigin,
    db::{PgStore, PostStore, RoleStore, UserStore},
    email::{EmailService, Mailer},
    errors::Error,
    openapi::ApiDoc,
};

/// Shared application state, cloned into every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub posts: Arc<dyn PostStore>,
    /// `None` when caching is disabled; every principal lookup then reads the store
    pub cache: Option<Arc<dyn PrincipalCache>>,
    pub authenticator: Arc<dyn TokenAuthenticator>,
    pub mailer: Arc<dyn Mailer>,
}

/// Get the authgate database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = &config.cors;

    let allow_origin = if cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut urls: Vec<Url> = cors
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin {
                CorsOrigin::Url(url) => Some(url.clone()),
                CorsOrigin::Wildcard => None,
            })
            .collect();
        if urls.is_empty() {
            urls.push(Url::parse(&config.frontend_url)?);
        }

        // Browsers send the bare origin, never a path or trailing slash
        let mut origins = Vec::with_capacity(urls.len());
        for url in &urls {
            origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
        }
        AllowOrigin::list(origins)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(cors.allow_credentials);

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Turn a handler panic into the same 500 body as any other internal error.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    Error::Internal {
        operation: format!("handle request (handler panicked: {detail})"),
    }
    .into_response()
}

/// Wrap a router in the layers every request passes through: panic recovery, timeout, CORS and
/// access logging.
fn with_request_layers(router: Router, config: &Config) -> anyhow::Result<Router> {
    Ok(router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout))
        .layer(create_cors_layer(config)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        ))
}

/// Build the `/v1` router with its gates and request layers.
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let operational_routes = Router::new()
        .route("/health", get(api::handlers::health::health))
        .route_layer(from_fn_with_state(state.clone(), basic_auth));

    let authenticated_routes = Router::new()
        .route("/users/{id}", get(api::handlers::users::get_user))
        .route("/posts", post(api::handlers::posts::create_post))
        .route(
            "/posts/{id}",
            get(api::handlers::posts::get_post)
                .patch(api::handlers::posts::update_post)
                .delete(api::handlers::posts::delete_post),
        )
        .route_layer(from_fn_with_state(state.clone(), bearer_auth));

    let public_routes = Router::new()
        .route("/authentication/user", post(api::handlers::auth::register))
        .route("/authentication/token", post(api::handlers::auth::login))
        .route("/users/activate/{token}", put(api::handlers::auth::activate))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let api_routes = public_routes
        .merge(authenticated_routes)
        .merge(operational_routes)
        .with_state(state.clone());

    with_request_layers(Router::new().nest("/v1", api_routes), &state.config)
}

/// A configured server, ready to [`serve`](Application::serve).
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Connect to Postgres, run migrations and build every component from `config`.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool_settings = &config.database.pool;
        let pool = PgPoolOptions::new()
            .max_connections(pool_settings.max_connections)
            .min_connections(pool_settings.min_connections)
            .acquire_timeout(pool_settings.acquire_timeout)
            .connect(&config.database.url)
            .await?;

        migrator().run(&pool).await?;
        info!("Database migrations applied");

        let store = Arc::new(PgStore::new(pool.clone()));
        let cache = cache::from_config(&config.cache)?;
        if cache.is_none() {
            info!("Principal cache disabled, every request reads the store");
        }

        let state = AppState::builder()
            .users(store.clone())
            .roles(store.clone())
            .posts(store)
            .maybe_cache(cache)
            .authenticator(Arc::new(JwtAuthenticator::new(&config.auth.token)?))
            .mailer(Arc::new(EmailService::new(&config.email)?))
            .config(config.clone())
            .build();

        Ok(Self {
            router: build_router(state)?,
            config,
            pool: Some(pool),
        })
    }

    /// Wrap already-built state, without a database pool of its own.
    pub fn from_state(state: AppState) -> anyhow::Result<Self> {
        Ok(Self {
            config: state.config.clone(),
            router: build_router(state)?,
            pool: None,
        })
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("authgate listening on http://{}", bind_addr);

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;
    use axum_test::TestServer;

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    async fn ok() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let config = create_test_config();
        let router = with_request_layers(Router::new().route("/boom", get(boom)).route("/ok", get(ok)), &config).unwrap();
        let server = TestServer::new(router).unwrap();

        let response = server.get("/boom").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "Internal server error");

        // The server keeps serving after a panic
        server.get("/ok").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let mut config = create_test_config();
        config.request_timeout = Duration::from_millis(50);
        let slow = || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        };
        let server = TestServer::new(with_request_layers(Router::new().route("/slow", get(slow)), &config).unwrap()).unwrap();

        server.get("/slow").await.assert_status(StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        let mut config = create_test_config();
        assert!(create_cors_layer(&config).is_ok());

        config.cors.allowed_origins = vec![CorsOrigin::Wildcard];
        assert!(create_cors_layer(&config).is_ok());

        config.cors.allowed_origins = vec![CorsOrigin::Url(Url::parse("https://app.example.com/some/path").unwrap())];
        config.cors.max_age = Some(600);
        assert!(create_cors_layer(&config).is_ok());
    }
}
