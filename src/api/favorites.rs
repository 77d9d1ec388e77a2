// src/api/favorites.rs

use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::auth::AuthUser;
use crate::api::parse_id;
use crate::error::{AppError, AppResult};
use crate::{db, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub product_id: i32,
}

#[get("/favorites")]
pub async fn list_favorites(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let favorites = db::list_favorites(&state.pool, user.id()).await?;
    Ok(HttpResponse::Ok().json(favorites))
}

#[post("/favorites")]
pub async fn add_favorite(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<FavoriteRequest>,
) -> AppResult<HttpResponse> {
    if db::get_product(&state.pool, payload.product_id).await?.is_none() {
        return Err(AppError::NotFound("Product not found".to_string()));
    }
    let favorite = db::add_favorite(&state.pool, user.id(), payload.product_id).await?;
    Ok(HttpResponse::Ok().json(favorite))
}

#[get("/favorites/{product_id}")]
pub async fn is_favorite(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let product_id = parse_id(&path, "product")?;
    let is_favorite = db::is_favorite(&state.pool, user.id(), product_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "isFavorite": is_favorite })))
}

#[delete("/favorites/{product_id}")]
pub async fn remove_favorite(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let product_id = parse_id(&path, "product")?;
    db::remove_favorite(&state.pool, user.id(), product_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
