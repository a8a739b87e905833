pub mod orders;
pub mod payments;
pub mod webhooks;

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::application::idempotency_guard::{Execution, IdempotencyGuard};
use crate::domain::idempotency::ResultSnapshot;
use crate::errors::AppError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const IDEMPOTENT_REPLAYED_HEADER: &str = "Idempotent-Replayed";

/// `{success, message, data}` wrapper used by every response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Serialises an enveloped body into the snapshot an idempotent call stores.
pub(crate) fn snapshot<T: Serialize>(
    status: StatusCode,
    body: &ApiResponse<T>,
) -> Result<ResultSnapshot, AppError> {
    let body = serde_json::to_value(body).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(ResultSnapshot::new(status.as_u16(), body))
}

pub(crate) fn idempotency_key(req: &HttpRequest) -> Result<Option<String>, AppError> {
    match req.headers().get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|key| Some(key.trim().to_string()))
            .map_err(|_| AppError::BadRequest("Idempotency-Key must be visible ASCII".to_string())),
    }
}

/// Runs `operation` on the blocking pool, behind the idempotency guard when the
/// request carries an `Idempotency-Key`.
pub(crate) async fn run_idempotent<F>(
    guard: Arc<IdempotencyGuard>,
    key: Option<String>,
    fingerprint: String,
    operation: F,
) -> Result<Execution, AppError>
where
    F: FnOnce() -> Result<ResultSnapshot, AppError> + Send + 'static,
{
    web::block(move || match key {
        Some(key) => guard.execute(&key, &fingerprint, operation),
        None => operation().map(|result| Execution {
            result,
            replayed: false,
        }),
    })
    .await?
}

pub(crate) fn execution_response(execution: Execution) -> HttpResponse {
    let status = StatusCode::from_u16(execution.result.status).unwrap_or(StatusCode::OK);
    let mut response = HttpResponse::build(status);
    if execution.replayed {
        response.insert_header((IDEMPOTENT_REPLAYED_HEADER, "true"));
    }
    response.json(execution.result.body)
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Order lifecycle API",
        description = "Order state machine, driver assignment, payment intents and provider webhooks. \
                       Every body is wrapped in `{success, message, data}`."
    ),
    paths(
        orders::create_order,
        orders::get_order,
        orders::accept_order,
        orders::update_status,
        orders::assign_driver,
        orders::status_history,
        payments::create_intent,
        payments::get_intent,
        webhooks::receive_webhook,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Order lifecycle"),
        (name = "payments", description = "Payment intents and provider callbacks"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_shape() {
        let body = serde_json::to_value(ApiResponse::ok("done", json!({ "id": 1 }))).unwrap();
        assert_eq!(body, json!({ "success": true, "message": "done", "data": { "id": 1 } }));
    }

    #[test]
    fn idempotency_key_is_optional_and_trimmed() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(idempotency_key(&req).unwrap(), None);

        let req = TestRequest::default()
            .insert_header((IDEMPOTENCY_KEY_HEADER, " abc-123 "))
            .to_http_request();
        assert_eq!(idempotency_key(&req).unwrap(), Some("abc-123".to_string()));
    }

    #[test]
    fn replayed_execution_carries_header_and_status() {
        let response = execution_response(Execution {
            result: ResultSnapshot::new(201, json!({ "success": true })),
            replayed: true,
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(IDEMPOTENT_REPLAYED_HEADER).unwrap(),
            "true"
        );
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/orders",
            "/orders/{id}",
            "/orders/{id}/accept",
            "/orders/{id}/status",
            "/orders/{id}/assign/{driver_id}",
            "/orders/{id}/status-history",
            "/payments/intent",
            "/payments/{id}",
            "/payments/webhook",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
