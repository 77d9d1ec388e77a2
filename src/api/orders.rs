// src/api/orders.rs

use actix_web::{get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::api::auth::AuthUser;
use crate::api::{optional_json, parse_id, require_admin};
use crate::db::{TrackingEventInput, TrackingUpdate};
use crate::error::{AppError, AppResult};
use crate::models::OrderStatus;
use crate::{db, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: Option<serde_json::Value>,
}

#[post("/orders")]
pub async fn create_order(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let payload = optional_json::<CreateOrderRequest>(&body)?;
    if payload.shipping_address.as_ref().is_some_and(|a| !a.is_object()) {
        return Err(AppError::Validation("shippingAddress must be an object".to_string()));
    }

    let detail = db::create_order_from_cart(&state.pool, user.id(), payload.shipping_address)
        .await?
        .ok_or_else(|| AppError::Validation("Cart is empty".to_string()))?;

    log::info!(
        "order placed id={} user_id={} total={}",
        detail.order.id,
        user.id(),
        detail.order.total_amount
    );
    Ok(HttpResponse::Created().json(detail))
}

#[get("/orders")]
pub async fn list_orders(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let orders = db::list_orders(&state.pool, user.id()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

#[get("/orders/{id}")]
pub async fn get_order(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_id(&path, "order")?;
    let detail = db::get_order_detail(&state.pool, id)
        .await?
        // Someone else's order looks the same as a missing one.
        .filter(|d| d.order.user_id == user.id())
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    Ok(HttpResponse::Ok().json(detail))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(flatten)]
    pub tracking: TrackingUpdate,
}

#[put("/admin/orders/{id}/status")]
pub async fn update_order_status(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    let id = parse_id(&path, "order")?;
    let UpdateStatusRequest { status, mut tracking } = payload.into_inner();

    let current = db::get_order(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    if status == OrderStatus::Shipped
        && tracking.tracking_number.is_none()
        && current.tracking_number.is_none()
    {
        tracking.tracking_number = Some(db::generate_tracking_number());
    }

    let order = db::update_order_status(&state.pool, id, status, &tracking)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    log::info!("order id={} moved to {}", id, status.as_str());
    Ok(HttpResponse::Ok().json(order))
}

#[post("/admin/orders/{id}/tracking")]
pub async fn add_tracking_event(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<TrackingEventInput>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    let id = parse_id(&path, "order")?;
    if payload.tracking_number.trim().is_empty() || payload.status.trim().is_empty() {
        return Err(AppError::Validation(
            "trackingNumber and status are required".to_string(),
        ));
    }
    if db::get_order(&state.pool, id).await?.is_none() {
        return Err(AppError::NotFound("Order not found".to_string()));
    }

    let event = db::add_tracking_event(&state.pool, id, &payload).await?;
    Ok(HttpResponse::Created().json(event))
}
