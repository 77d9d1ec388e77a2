// src/api/webhooks_razorpay.rs
//
// `payment.captured` from Razorpay is the only signal that creates a verified
// payment and, with it, library access.

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::api::razorpay::{
    amount_is_storable, minor_units_to_decimal, verify_webhook_signature, FlexibleId,
};
use crate::db::NewPayment;
use crate::error::is_foreign_key_violation;
use crate::library::{self, GrantOutcome, LibraryError};
use crate::models::{PAYMENT_METHOD_WEBHOOK_VERIFIED, PAYMENT_STATUS_COMPLETED};
use crate::ws::{NotifyUser, PushEvent};
use crate::{db, AppState};

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

#[derive(Debug, Deserialize, ToSchema)]
pub struct RazorpayWebhook {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<PaymentWrapper>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentWrapper {
    #[serde(default)]
    pub entity: Option<PaymentEntity>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentEntity {
    #[serde(default)]
    pub id: String,
    /// Minor units (paise).
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
    /// An object with `user_id` / `product_id`; Razorpay sends `[]` when empty.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub notes: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub payment_id: String,
    pub amount_minor: i64,
    pub user_id: String,
    pub product_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDecision {
    /// Acknowledged with 200 and `processed: false`.
    Ignore(&'static str),
    MissingData,
    /// Non-positive, or too large for the payments table.
    InvalidAmount(i64),
    Capture(CapturedPayment),
}

fn note_text(notes: &Value, key: &str) -> Option<String> {
    match notes.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn note_id(notes: &Value, key: &str) -> Option<i32> {
    notes
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value::<FlexibleId>(v).ok())
        .and_then(|id| id.as_positive_i32())
}

/// Everything the webhook decides before touching storage.
pub fn classify(hook: &RazorpayWebhook) -> WebhookDecision {
    let entity = hook
        .payload
        .as_ref()
        .and_then(|p| p.payment.as_ref())
        .and_then(|p| p.entity.as_ref());

    let Some(entity) = entity.filter(|_| hook.event == "payment.captured") else {
        return WebhookDecision::Ignore("event_not_handled");
    };

    if entity.status != "captured" {
        return WebhookDecision::Ignore("not_captured");
    }

    if !amount_is_storable(entity.amount) {
        return WebhookDecision::InvalidAmount(entity.amount);
    }

    let user_id = note_text(&entity.notes, "user_id");
    let product_id = note_id(&entity.notes, "product_id");
    match (user_id, product_id) {
        (Some(user_id), Some(product_id)) if !entity.id.trim().is_empty() => {
            WebhookDecision::Capture(CapturedPayment {
                payment_id: entity.id.trim().to_string(),
                amount_minor: entity.amount,
                user_id,
                product_id,
            })
        }
        _ => WebhookDecision::MissingData,
    }
}

fn not_processed(reason: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "processed": false, "reason": reason }))
}

fn processing_failed() -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "error": "Webhook processing failed" }))
}

#[utoipa::path(
    post,
    path = "/api/webhook/razorpay",
    tag = "webhooks",
    request_body = RazorpayWebhook,
    responses(
        (status = 200, description = "Processed, duplicate, or ignored event"),
        (status = 400, description = "Missing notes, bad amount or unknown product"),
        (status = 401, description = "Signature mismatch when a webhook secret is configured")
    )
)]
#[post("/api/webhook/razorpay")]
pub async fn razorpay_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Some(secret) = state.config.razorpay_webhook_secret.as_deref() {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_webhook_signature(secret, &body, signature) {
            log::warn!("razorpay webhook rejected: bad signature");
            return HttpResponse::Unauthorized().json(json!({ "error": "Invalid signature" }));
        }
    }

    let hook = match serde_json::from_slice::<RazorpayWebhook>(&body) {
        Ok(h) => h,
        Err(e) => {
            log::warn!("razorpay webhook body error: {e}");
            return HttpResponse::BadRequest().json(json!({ "error": "Invalid webhook payload" }));
        }
    };

    let captured = match classify(&hook) {
        WebhookDecision::Capture(c) => c,
        WebhookDecision::Ignore(reason) => {
            log::info!("razorpay webhook event={:?} ignored: {reason}", hook.event);
            return not_processed(reason);
        }
        WebhookDecision::MissingData => {
            log::error!("razorpay webhook missing user or product id");
            return HttpResponse::BadRequest()
                .json(json!({ "error": "Missing required webhook data" }));
        }
        WebhookDecision::InvalidAmount(amount) => {
            log::error!("razorpay webhook amount={amount} out of range");
            return HttpResponse::BadRequest().json(json!({ "error": "Invalid payment amount" }));
        }
    };

    let product = match db::get_product(&state.pool, captured.product_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            log::error!("razorpay webhook product_id={} not found", captured.product_id);
            return HttpResponse::BadRequest().json(json!({ "error": "Product not found" }));
        }
        Err(e) => {
            log::error!("razorpay webhook get_product error: {e}");
            return processing_failed();
        }
    };

    let amount = minor_units_to_decimal(captured.amount_minor);
    let notes = json!({
        "webhook_verified": true,
        "verified_at": Utc::now().to_rfc3339(),
        "product_name": product.name,
    });
    let new_payment = NewPayment {
        payment_id: &captured.payment_id,
        user_id: &captured.user_id,
        product_id: captured.product_id,
        amount: &amount,
        status: PAYMENT_STATUS_COMPLETED,
        payment_method: PAYMENT_METHOD_WEBHOOK_VERIFIED,
        razorpay_link_used: product.razorpay_link.as_deref(),
        issue_notes: Some(notes.to_string()),
    };

    match library::record_payment_and_grant(&state.pool, &new_payment).await {
        Ok(GrantOutcome::Duplicate) => {
            log::info!("razorpay webhook duplicate payment_id={}", captured.payment_id);
            not_processed("duplicate")
        }
        Ok(GrantOutcome::Granted { entry, .. }) => {
            log::info!(
                "payment verified payment_id={} user_id={} product_id={} new_grant={}",
                captured.payment_id,
                captured.user_id,
                captured.product_id,
                entry.is_some()
            );
            if entry.is_some() {
                state.ws_hub.do_send(NotifyUser {
                    user_id: captured.user_id.clone(),
                    event: PushEvent::library_granted(
                        captured.product_id,
                        product.name.clone(),
                        captured.payment_id.clone(),
                    ),
                });
            }
            HttpResponse::Ok().json(json!({
                "processed": true,
                "message": "Payment verified and access granted",
                "paymentId": captured.payment_id,
            }))
        }
        Err(LibraryError::Database(e)) if is_foreign_key_violation(&e) => {
            log::error!("razorpay webhook unknown user_id={}", captured.user_id);
            HttpResponse::BadRequest().json(json!({ "error": "User not found" }))
        }
        Err(e) => {
            log::error!("razorpay webhook grant error payment_id={}: {e}", captured.payment_id);
            processing_failed()
        }
    }
}

#[get("/api/webhook/razorpay")]
pub async fn razorpay_webhook_status() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Razorpay webhook endpoint is active",
        "timestamp": Utc::now().to_rfc3339(),
        "methods": ["POST"],
    }))
}
