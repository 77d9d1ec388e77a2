// src/api/operator.rs
//
// Reconciliation tools for payments whose library rows went missing. They are
// admin-only and off unless ENABLE_OPERATOR_TOOLS is set; the client-asserted
// grant endpoints stay disabled for good.

use actix_web::{post, web, HttpResponse};
use serde::Deserialize;

use crate::api::auth::AuthUser;
use crate::api::{optional_json, require_operator_tools};
use crate::error::{AppError, AppResult};
use crate::reconcile::{self, ExternalPaymentRecord, ReconcileCustomer};
use crate::AppState;

/// Optional target user; defaults to the operator.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetUser {
    pub user_id: Option<String>,
}

impl TargetUser {
    fn resolve(self, operator: &AuthUser) -> String {
        self.user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| operator.id().to_string())
    }
}

#[post("/diagnose-payments")]
pub async fn diagnose_payments(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    require_operator_tools(&state, &user)?;
    let target = optional_json::<TargetUser>(&body)?.resolve(&user);

    let diagnosis = reconcile::diagnose(&state.pool, &target).await?;
    Ok(HttpResponse::Ok().json(diagnosis))
}

#[post("/sync-payments")]
pub async fn sync_payments(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    require_operator_tools(&state, &user)?;
    let target = optional_json::<TargetUser>(&body)?.resolve(&user);

    log::info!("force sync requested by user_id={} for user_id={}", user.id(), target);
    let report = reconcile::force_sync(&state.pool, &target).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[derive(Debug, Deserialize)]
pub struct BulkReconcileRequest {
    pub payments: Vec<ExternalPaymentRecord>,
}

#[post("/bulk-reconcile-payments")]
pub async fn bulk_reconcile_payments(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<BulkReconcileRequest>,
) -> AppResult<HttpResponse> {
    require_operator_tools(&state, &user)?;
    if payload.payments.is_empty() {
        return Err(AppError::Validation("payments must not be empty".to_string()));
    }

    let report = reconcile::bulk_reconcile(
        &state.pool,
        state.razorpay.as_ref(),
        user.id(),
        &payload.payments,
    )
    .await;
    Ok(HttpResponse::Ok().json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileByIdsRequest {
    pub payment_ids: Vec<String>,
    pub amount: f64,
    pub product_id: i32,
    #[serde(default)]
    pub customer_details: ReconcileCustomer,
}

impl ReconcileByIdsRequest {
    fn into_records(self) -> Vec<ExternalPaymentRecord> {
        let Self {
            payment_ids,
            amount,
            product_id,
            customer_details,
        } = self;
        payment_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(|payment_id| ExternalPaymentRecord {
                payment_id,
                amount,
                product_id,
                customer_details: customer_details.clone(),
            })
            .collect()
    }
}

#[post("/reconcile-razorpay-payments")]
pub async fn reconcile_razorpay_payments(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<ReconcileByIdsRequest>,
) -> AppResult<HttpResponse> {
    require_operator_tools(&state, &user)?;
    let records = payload.into_inner().into_records();
    if records.is_empty() {
        return Err(AppError::Validation("paymentIds must not be empty".to_string()));
    }

    let report =
        reconcile::bulk_reconcile(&state.pool, state.razorpay.as_ref(), user.id(), &records).await;
    Ok(HttpResponse::Ok().json(report))
}

/// Grants that trusted the client instead of the provider.
#[post("/complete-purchase")]
pub async fn complete_purchase() -> AppResult<HttpResponse> {
    Err(AppError::Disabled)
}

#[post("/grant-verified-access")]
pub async fn grant_verified_access() -> AppResult<HttpResponse> {
    Err(AppError::Disabled)
}

#[post("/verify-payment")]
pub async fn verify_payment() -> AppResult<HttpResponse> {
    Err(AppError::Disabled)
}
