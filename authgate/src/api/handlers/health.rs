use axum::Json;

use crate::api::models::health::HealthResponse;

/// Report that the service is up
#[utoipa::path(
    get,
    path = "/health",
    tag = "operations",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 401, description = "Operator credentials missing or wrong"),
    ),
    security(("BasicAuth" = []))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
