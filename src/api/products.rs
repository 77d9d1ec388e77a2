// src/api/products.rs
//
// Catalog reads are public; writes sit under the authenticated `/api` scope and
// require an admin.

use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::api::auth::AuthUser;
use crate::api::{parse_id, require_admin};
use crate::error::{is_foreign_key_violation, is_unique_violation, AppError, AppResult};
use crate::models::ProductInput;
use crate::{db, AppState};

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[get("/api/products")]
pub async fn list_products(
    state: web::Data<AppState>,
    query: web::Query<ProductQuery>,
) -> AppResult<HttpResponse> {
    let products = db::list_products(
        &state.pool,
        query.category.as_deref(),
        query.search.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(products))
}

#[get("/api/products/{id}")]
pub async fn get_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_id(&path, "product")?;
    let product = db::get_product(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    if let Err(e) = db::increment_view_count(&state.pool, id).await {
        log::warn!("increment_view_count failed product_id={id}: {e}");
    }
    Ok(HttpResponse::Ok().json(product))
}

fn validate_product(input: &ProductInput) -> AppResult<()> {
    if input.name.trim().is_empty() || input.brand.trim().is_empty() {
        return Err(AppError::Validation("name and brand are required".to_string()));
    }
    let price_ok = |p: &str| p.trim().parse::<f64>().map_or(false, |v| v >= 0.0);
    if !price_ok(input.price.as_str()) || !input.original_price.as_deref().map_or(true, price_ok) {
        return Err(AppError::Validation("price must be a non-negative number".to_string()));
    }
    Ok(())
}

#[post("/products")]
pub async fn create_product(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<ProductInput>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    validate_product(&payload)?;

    let product = db::create_product(&state.pool, &payload).await?;
    log::info!("product created id={} by user_id={}", product.id, user.id());
    Ok(HttpResponse::Created().json(product))
}

#[put("/products/{id}")]
pub async fn update_product(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<ProductInput>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    let id = parse_id(&path, "product")?;
    validate_product(&payload)?;

    let product = db::update_product(&state.pool, id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
    Ok(HttpResponse::Ok().json(product))
}

#[delete("/products/{id}")]
pub async fn delete_product(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    let id = parse_id(&path, "product")?;

    match db::delete_product(&state.pool, id).await {
        Ok(true) => Ok(HttpResponse::NoContent().finish()),
        Ok(false) => Err(AppError::NotFound("Product not found".to_string())),
        // Payment and library rows keep their product.
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::Validation(
            "Product has payments and cannot be deleted".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

#[get("/api/categories")]
pub async fn list_categories(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let categories = db::list_categories(&state.pool).await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[post("/categories")]
pub async fn create_category(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<CategoryInput>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }

    match db::create_category(
        &state.pool,
        name,
        payload.description.as_deref(),
        payload.icon.as_deref(),
    )
    .await
    {
        Ok(category) => Ok(HttpResponse::Created().json(category)),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::Validation("Category already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[put("/categories/{id}")]
pub async fn update_category(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<CategoryUpdate>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    let id = parse_id(&path, "category")?;
    let name = payload.name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    match db::update_category(
        &state.pool,
        id,
        name,
        payload.description.as_deref(),
        payload.icon.as_deref(),
    )
    .await
    {
        Ok(Some(category)) => Ok(HttpResponse::Ok().json(category)),
        Ok(None) => Err(AppError::NotFound("Category not found".to_string())),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::Validation("Category already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[delete("/categories/{id}")]
pub async fn delete_category(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    require_admin(&state, &user)?;
    let id = parse_id(&path, "category")?;

    if !db::deactivate_category(&state.pool, id).await? {
        return Err(AppError::NotFound("Category not found".to_string()));
    }
    log::info!("category id={id} deactivated by user_id={}", user.id());
    Ok(HttpResponse::NoContent().finish())
}
