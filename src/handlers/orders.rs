use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{execution_response, idempotency_key, run_idempotent, snapshot, ApiResponse};
use crate::auth::AuthenticatedActor;
use crate::domain::order::{
    NewOrder, Order, OrderItem, OrderStatus, PaymentMethod, SelectedModifier, StatusHistoryEntry,
};
use crate::errors::AppError;
use crate::state::AppState;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectedModifierDto {
    pub modifier_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemRequest {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    /// Price in minor units, e.g. `2599` for 25.99
    pub unit_price_cents: i64,
    #[serde(default)]
    pub selected_modifiers: Vec<SelectedModifierDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub vendor_id: Uuid,
    pub address_id: Uuid,
    /// `card` or `cash`
    #[schema(example = "card")]
    pub payment_method: String,
    pub items: Vec<CreateOrderItemRequest>,
}

impl CreateOrderRequest {
    fn into_new_order(self, customer_id: Uuid) -> Result<NewOrder, AppError> {
        let payment_method: PaymentMethod = self.payment_method.parse()?;
        Ok(NewOrder {
            customer_id,
            vendor_id: self.vendor_id,
            address_id: self.address_id,
            payment_method,
            items: self
                .items
                .into_iter()
                .map(|item| OrderItem {
                    menu_item_id: item.menu_item_id,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    selected_modifiers: item
                        .selected_modifiers
                        .into_iter()
                        .map(|m| SelectedModifier {
                            modifier_id: m.modifier_id,
                            name: m.name,
                            price_cents: m.price_cents,
                        })
                        .collect(),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = "PREPARING")]
    pub status: String,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub selected_modifiers: Vec<SelectedModifierDto>,
    pub line_total_cents: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryResponse {
    pub status: String,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl From<&StatusHistoryEntry> for StatusHistoryResponse {
    fn from(entry: &StatusHistoryEntry) -> Self {
        Self {
            status: entry.status.as_str().to_string(),
            note: entry.note.clone(),
            actor_id: entry.actor_id,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub address_id: Uuid,
    pub payment_method: String,
    #[schema(example = "PLACED")]
    pub status: String,
    pub total_cents: i64,
    pub items: Vec<OrderItemResponse>,
    pub status_history: Vec<StatusHistoryResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            vendor_id: order.vendor_id,
            driver_id: order.driver_id,
            address_id: order.address_id,
            payment_method: order.payment_method.as_str().to_string(),
            status: order.status.as_str().to_string(),
            total_cents: order.total_cents,
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    menu_item_id: item.menu_item_id,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    selected_modifiers: item
                        .selected_modifiers
                        .iter()
                        .map(|m| SelectedModifierDto {
                            modifier_id: m.modifier_id,
                            name: m.name.clone(),
                            price_cents: m.price_cents,
                        })
                        .collect(),
                    line_total_cents: item.line_total_cents().unwrap_or_default(),
                })
                .collect(),
            status_history: order
                .status_history
                .iter()
                .map(StatusHistoryResponse::from)
                .collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

fn order_ok(message: &str, order: &Order) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(message, OrderResponse::from(order)))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Places an order for the calling customer. With an `Idempotency-Key` header
/// a repeated request replays the first response instead of creating another
/// order.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Deduplicates retried requests"),
    ),
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid items"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not a customer"),
        (status = 409, description = "Same key still in progress"),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let actor = actor.0;
    let new_order = body.into_inner().into_new_order(actor.id)?;
    let key = idempotency_key(&req)?;
    let orders = state.orders.clone();

    let execution = run_idempotent(
        state.idempotency.clone(),
        key,
        format!("POST /orders:{}", actor.id),
        move || {
            let order = orders.create_order(&actor, new_order)?;
            snapshot(
                StatusCode::CREATED,
                &ApiResponse::ok("Order placed", OrderResponse::from(&order)),
            )
        },
    )
    .await?;

    Ok(execution_response(execution))
}

/// GET /orders/{id}
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let orders = state.orders.clone();
    let order = web::block(move || orders.get_order_for(&actor.0, order_id)).await??;
    Ok(order_ok("Order found", &order))
}

/// POST /orders/{id}/accept
#[utoipa::path(
    post,
    path = "/orders/{id}/accept",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order accepted", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is not PLACED"),
        (status = 403, description = "Caller is not the order's vendor"),
        (status = 503, description = "Order is locked by another update"),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
pub async fn accept_order(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let orders = state.orders.clone();
    let order = web::block(move || orders.accept(order_id, &actor.0)).await??;
    Ok(order_ok("Order accepted", &order))
}

/// PATCH /orders/{id}/status
///
/// Moves the order along one legal edge. Driver assignment has its own route.
#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    request_body = UpdateStatusRequest,
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Illegal transition or unknown status"),
        (status = 403, description = "Caller may not drive this edge"),
        (status = 409, description = "Card payment not captured yet"),
        (status = 503, description = "Order is locked by another update"),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
pub async fn update_status(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let UpdateStatusRequest { status, note } = body.into_inner();
    let target: OrderStatus = status.parse()?;
    let orders = state.orders.clone();
    let order = web::block(move || orders.transition(order_id, target, &actor.0, note)).await??;
    Ok(order_ok("Order status updated", &order))
}

/// POST /orders/{id}/assign/{driver_id}
#[utoipa::path(
    post,
    path = "/orders/{id}/assign/{driver_id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
        ("driver_id" = Uuid, Path, description = "Driver UUID"),
    ),
    responses(
        (status = 200, description = "Driver assigned", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is not READY"),
        (status = 403, description = "Caller may not assign this driver"),
        (status = 409, description = "Driver has no free capacity"),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
pub async fn assign_driver(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (order_id, driver_id) = path.into_inner();
    let orders = state.orders.clone();
    let order = web::block(move || orders.assign_driver(order_id, driver_id, &actor.0)).await??;
    Ok(order_ok("Driver assigned", &order))
}

/// GET /orders/{id}/status-history
#[utoipa::path(
    get,
    path = "/orders/{id}/status-history",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Ordered audit trail", body = ApiResponse<Vec<StatusHistoryResponse>>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
pub async fn status_history(
    state: web::Data<AppState>,
    actor: AuthenticatedActor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let orders = state.orders.clone();
    let history = web::block(move || orders.status_history(&actor.0, order_id)).await??;
    let history: Vec<StatusHistoryResponse> =
        history.iter().map(StatusHistoryResponse::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Status history", history)))
}
