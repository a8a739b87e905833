use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::ApiResponse;
use crate::application::webhook_ingestor::IngestOutcome;
use crate::errors::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub event_id: String,
    /// `processed`, `duplicate` or `deferred`
    pub outcome: String,
}

/// POST /payments/webhook
///
/// Provider callback. Authenticated by its HMAC signature instead of a bearer
/// token; the raw body is verified before it is parsed.
#[utoipa::path(
    post,
    path = "/payments/webhook",
    request_body(content = String, content_type = "application/json", description = "Raw provider event"),
    params(
        ("X-Webhook-Signature" = String, Header, description = "t=<unix seconds>,v1=<hex hmac-sha256>"),
    ),
    responses(
        (status = 200, description = "Event processed or already processed", body = ApiResponse<WebhookAck>),
        (status = 202, description = "Event recorded, effect still being applied", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Malformed signature header or payload"),
        (status = 401, description = "Signature mismatch or stale timestamp"),
    ),
    tag = "payments"
)]
pub async fn receive_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks.ingest(&payload, signature).await?;

    let response = match outcome {
        IngestOutcome::Processed { event_id } => HttpResponse::Ok().json(ApiResponse::ok(
            "Webhook processed",
            WebhookAck {
                event_id,
                outcome: "processed".to_string(),
            },
        )),
        IngestOutcome::Duplicate { event_id } => HttpResponse::Ok().json(ApiResponse::ok(
            "Webhook already processed",
            WebhookAck {
                event_id,
                outcome: "duplicate".to_string(),
            },
        )),
        IngestOutcome::Deferred { event_id } => HttpResponse::Accepted().json(ApiResponse::ok(
            "Webhook accepted",
            WebhookAck {
                event_id,
                outcome: "deferred".to_string(),
            },
        )),
    };
    Ok(response)
}
