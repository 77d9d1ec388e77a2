// src/api/payments.rs
//
// Builds the hosted payment link for a product. Nothing is granted here: access
// only follows the provider's `payment.captured` webhook.

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::auth::AuthUser;
use crate::api::razorpay::{build_payment_url, CustomerPrefill, FlexibleId};
use crate::error::{AppError, AppResult};
use crate::{db, AppState};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CustomerDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentSessionRequest {
    /// Number or numeric string.
    #[schema(value_type = i32)]
    pub product_id: FlexibleId,
    #[serde(default)]
    pub customer_details: CustomerDetails,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionResponse {
    pub success: bool,
    pub payment_url: String,
    pub product_name: String,
    /// Decimal string in major units.
    pub amount: String,
    pub message: &'static str,
}

#[utoipa::path(
    post,
    path = "/api/create-payment-session",
    tag = "payments",
    request_body = CreatePaymentSessionRequest,
    responses(
        (status = 200, description = "Payment link with prefill and tracking notes", body = PaymentSessionResponse),
        (status = 400, description = "Invalid product id or no payment link configured"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer" = []))
)]
#[post("/create-payment-session")]
pub async fn create_payment_session(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<CreatePaymentSessionRequest>,
) -> AppResult<HttpResponse> {
    let product_id = payload
        .product_id
        .as_positive_i32()
        .ok_or_else(|| AppError::Validation("Invalid product ID".to_string()))?;

    let product = db::get_product(&state.pool, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let link = product
        .razorpay_link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            AppError::Validation("No payment link configured for this product".to_string())
        })?;

    let customer = &payload.customer_details;
    let payment_url = build_payment_url(
        link,
        &CustomerPrefill {
            name: &customer.name,
            email: &customer.email,
            phone: &customer.phone,
        },
        user.id(),
        product_id,
    );

    log::info!(
        "payment url generated user_id={} product_id={}; access waits for webhook",
        user.id(),
        product_id
    );

    Ok(HttpResponse::Ok().json(PaymentSessionResponse {
        success: true,
        payment_url,
        product_name: product.name,
        amount: product.price,
        message: "Complete payment to get instant access. Access granted only after payment verification.",
    }))
}
