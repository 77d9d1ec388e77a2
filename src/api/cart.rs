// src/api/cart.rs

use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::api::auth::AuthUser;
use crate::api::parse_id;
use crate::error::{AppError, AppResult};
use crate::{db, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: i32,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

fn check_quantity(quantity: i32) -> AppResult<()> {
    if !(1..=db::MAX_CART_QUANTITY).contains(&quantity) {
        return Err(AppError::Validation(format!(
            "quantity must be between 1 and {}",
            db::MAX_CART_QUANTITY
        )));
    }
    Ok(())
}

#[get("/cart")]
pub async fn list_cart(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let lines = db::list_cart(&state.pool, user.id()).await?;
    Ok(HttpResponse::Ok().json(lines))
}

#[post("/cart")]
pub async fn add_to_cart(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<AddToCartRequest>,
) -> AppResult<HttpResponse> {
    check_quantity(payload.quantity)?;
    if db::get_product(&state.pool, payload.product_id).await?.is_none() {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    let item = db::add_to_cart(&state.pool, user.id(), payload.product_id, payload.quantity).await?;
    Ok(HttpResponse::Ok().json(item))
}

#[put("/cart/{id}")]
pub async fn update_cart_item(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<UpdateQuantityRequest>,
) -> AppResult<HttpResponse> {
    let id = parse_id(&path, "cart item")?;
    check_quantity(payload.quantity)?;

    let item = db::update_cart_item(&state.pool, user.id(), id, payload.quantity)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart item not found".to_string()))?;
    Ok(HttpResponse::Ok().json(item))
}

#[delete("/cart/{id}")]
pub async fn remove_cart_item(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_id(&path, "cart item")?;
    if !db::remove_cart_item(&state.pool, user.id(), id).await? {
        return Err(AppError::NotFound("Cart item not found".to_string()));
    }
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/cart")]
pub async fn clear_cart(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    db::clear_cart(&state.pool, user.id()).await?;
    Ok(HttpResponse::NoContent().finish())
}
