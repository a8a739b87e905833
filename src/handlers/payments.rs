use std::str::FromStr;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{execution_response, idempotency_key, run_idempotent, snapshot, ApiResponse};
use crate::auth::AuthenticatedActor;
use crate::domain::errors::DomainError;
use crate::domain::payment::{amount_to_cents, PaymentIntent};
use crate::errors::AppError;
use crate::state::AppState;

// ── Request / response DTOs ──────────────────────────────────────────────────

/// Accepts `25.99` as well as `"25.99"`; strings avoid float rounding.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(f64),
}

impl AmountInput {
    pub fn to_cents(&self) -> Result<i64, DomainError> {
        let raw = match self {
            AmountInput::Text(text) => text.trim().to_string(),
            AmountInput::Number(number) if number.is_finite() => number.to_string(),
            AmountInput::Number(number) => {
                return Err(DomainError::InvalidInput(format!("amount {} is not finite", number)))
            }
        };
        let amount = BigDecimal::from_str(&raw)
            .map_err(|_| DomainError::InvalidInput(format!("amount '{}' is not a number", raw)))?;
        amount_to_cents(&amount)
    }
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
    /// Major units, must equal the order total exactly
    #[schema(value_type = String, example = "25.99")]
    pub amount: AmountInput,
    #[serde(default = "default_currency")]
    #[schema(example = "usd")]
    pub currency: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_payment_id: String,
    /// Only returned when the intent is created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub amount_cents: i64,
    #[schema(example = "25.99")]
    pub amount: String,
    pub currency: String,
    #[schema(example = "PENDING")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntentResponse {
    fn new(intent: &PaymentIntent, with_secret: bool) -> Self {
        Self {
            id: intent.id,
            order_id: intent.order_id,
            provider_payment_id: intent.provider_payment_id.clone(),
            client_secret: with_secret.then(|| intent.client_secret.clone()),
            amount_cents: intent.amount_cents,
            amount: format!("{}.{:02}", intent.amount_cents / 100, intent.amount_cents % 100),
            currency: intent.currency.clone(),
            status: intent.status.as_str().to_string(),
            created_at: intent.created_at,
            updated_at: intent.updated_at,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /payments/intent
///
/// Creates a PENDING intent for the full order total. The amount is checked
/// against the order before the provider is contacted.
#[utoipa::path(
    post,
    path = "/payments/intent",
    request_body = CreateIntentRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Deduplicates retried requests"),
    ),
    responses(
        (status = 201, description = "Intent created", body = ApiResponse<PaymentIntentResponse>),
        (status = 400, description = "Amount mismatch or invalid amount"),
        (status = 403, description = "Caller does not own the order"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already has a live intent or cannot be paid"),
    ),
    security(("bearer" = [])),
    tag = "payments"
)]
pub async fn create_intent(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    req: HttpRequest,
    body: web::Json<CreateIntentRequest>,
) -> Result<HttpResponse, AppError> {
    let actor = actor.0;
    let CreateIntentRequest {
        order_id,
        amount,
        currency,
    } = body.into_inner();
    let amount_cents = amount.to_cents()?;
    let key = idempotency_key(&req)?;
    let payments = state.payments.clone();

    let execution = run_idempotent(
        state.idempotency.clone(),
        key,
        format!("POST /payments/intent:{}", actor.id),
        move || {
            let intent = payments.create_intent(&actor, order_id, amount_cents, &currency)?;
            snapshot(
                StatusCode::CREATED,
                &ApiResponse::ok(
                    "Payment intent created",
                    PaymentIntentResponse::new(&intent, true),
                ),
            )
        },
    )
    .await?;

    Ok(execution_response(execution))
}

/// GET /payments/{id}
#[utoipa::path(
    get,
    path = "/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment intent UUID")),
    responses(
        (status = 200, description = "Intent found", body = ApiResponse<PaymentIntentResponse>),
        (status = 404, description = "Intent not found"),
    ),
    security(("bearer" = [])),
    tag = "payments"
)]
pub async fn get_intent(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let intent_id = path.into_inner();
    let payments = state.payments.clone();
    let intent = web::block(move || payments.get_intent(&actor.0, intent_id)).await??;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Payment intent found",
        PaymentIntentResponse::new(&intent, false),
    )))
}
