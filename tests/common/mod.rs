#![allow(dead_code)]

use std::collections::HashMap;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::header::HeaderMap;
use actix_web::http::StatusCode;
use actix_web::{test, web};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use order_lifecycle::application::signature::WebhookVerifier;
use order_lifecycle::config::Settings;
use order_lifecycle::domain::policy::{Actor, Role};
use order_lifecycle::state::{Adapters, AppState};

pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub fn settings() -> Settings {
    let env: HashMap<&str, &str> = [
        ("STORAGE", "memory"),
        ("WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("AUTH_SECRET", "integration-auth-secret"),
        ("WEBHOOK_TIMEOUT_MS", "2000"),
        ("ORDER_LOCK_TIMEOUT_MS", "500"),
    ]
    .into_iter()
    .collect();
    Settings::from_lookup(|key| env.get(key).map(|v| v.to_string()))
        .expect("test settings are valid")
}

pub fn memory_state() -> web::Data<AppState> {
    web::Data::new(AppState::new(&settings(), Adapters::in_memory()))
}

pub struct Party {
    pub actor: Actor,
    pub token: String,
}

impl Party {
    pub fn new(state: &AppState, role: Role) -> Self {
        let actor = Actor::new(role, Uuid::new_v4());
        let token = state.tokens.issue(&actor, Utc::now().timestamp() + 3600);
        Self { actor, token }
    }

    pub fn id(&self) -> Uuid {
        self.actor.id
    }

    pub fn bearer(&self) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.token))
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

pub async fn send<S, R, B>(app: &S, req: R) -> Reply
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = test::read_body(resp).await;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply {
        status,
        headers,
        body,
    }
}

pub fn order_body(vendor_id: Uuid, payment_method: &str, unit_price_cents: i64) -> Value {
    json!({
        "vendorId": vendor_id,
        "addressId": Uuid::new_v4(),
        "paymentMethod": payment_method,
        "items": [{
            "menuItemId": Uuid::new_v4(),
            "quantity": 1,
            "unitPriceCents": unit_price_cents,
            "selectedModifiers": []
        }]
    })
}

pub fn provider_event(event_id: &str, event_type: &str, provider_payment_id: &str, order_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": { "object": {
            "id": provider_payment_id,
            "metadata": { "order_id": order_id }
        } }
    }))
    .expect("serialisable event")
}

pub fn sign(payload: &[u8]) -> String {
    WebhookVerifier::new(WEBHOOK_SECRET, 300).sign(payload, Utc::now().timestamp())
}
