// src/api/library.rs

use actix_web::http::header::{CacheControl, CacheDirective};
use actix_web::{get, web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::auth::AuthUser;
use crate::api::parse_id;
use crate::error::AppResult;
use crate::{db, library, AppState};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub has_access: bool,
}

#[utoipa::path(
    get,
    path = "/api/access/{product_id}",
    tag = "library",
    params(("product_id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Whether the caller may open the product", body = AccessResponse),
        (status = 400, description = "Invalid product id"),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer" = []))
)]
#[get("/access/{product_id}")]
pub async fn check_access(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let product_id = parse_id(&path, "product")?;
    let has_access = library::has_access(&state.pool, user.id(), product_id).await?;
    Ok(HttpResponse::Ok().json(AccessResponse { has_access }))
}

#[get("/payment-status/{product_id}")]
pub async fn payment_status(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let product_id = parse_id(&path, "product")?;
    let report = library::payment_status(&state.pool, user.id(), product_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/library",
    tag = "library",
    responses(
        (status = 200, description = "Products with a granted library row and a verified payment, newest purchase first"),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer" = []))
)]
#[get("/library")]
pub async fn list_library(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let items = library::list_library(&state.pool, user.id()).await?;
    Ok(HttpResponse::Ok()
        .insert_header(CacheControl(vec![
            CacheDirective::NoCache,
            CacheDirective::NoStore,
            CacheDirective::MustRevalidate,
        ]))
        .json(items))
}

#[get("/payments")]
pub async fn list_payments(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let payments = db::list_user_payments(&state.pool, user.id()).await?;
    Ok(HttpResponse::Ok().json(payments))
}
