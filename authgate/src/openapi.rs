//! OpenAPI document for the `/v1` API, served at `/v1/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Bearer tokens for user routes, Basic credentials for operational routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Token from `POST /v1/authentication/token`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "BasicAuth".to_string(),
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/v1", description = "Authgate API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::health::health,
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::activate,
        api::handlers::users::get_user,
        api::handlers::posts::create_post,
        api::handlers::posts::get_post,
        api::handlers::posts::update_post,
        api::handlers::posts::delete_post,
    ),
    components(
        schemas(
            api::models::health::HealthResponse,
            api::models::auth::RegisterRequest,
            api::models::auth::RegisterResponse,
            api::models::auth::LoginRequest,
            api::models::auth::TokenResponse,
            api::models::users::UserResponse,
            api::models::users::RoleResponse,
            api::models::posts::PostCreate,
            api::models::posts::PostUpdate,
            api::models::posts::PostResponse,
        )
    ),
    tags(
        (name = "authentication", description = "Registration, activation and token issuance"),
        (name = "users", description = "User lookup"),
        (name = "posts", description = "User-owned posts"),
        (name = "operations", description = "Operator endpoints"),
    )
)]
pub struct ApiDoc;
