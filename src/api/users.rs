// src/api/users.rs

use actix_web::{get, put, web, HttpResponse};
use serde_json::json;

use crate::api::auth::AuthUser;
use crate::db::ProfileUpdate;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::{db, AppState};

#[get("/auth/user")]
pub async fn current_user(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let profile = db::get_user(&state.pool, user.id())
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(HttpResponse::Ok().json(profile))
}

#[put("/profile")]
pub async fn update_profile(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
    payload: web::Json<ProfileUpdate>,
) -> AppResult<HttpResponse> {
    let mut update = payload.into_inner();
    update.email = update
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    if update.email.as_deref().map_or(false, |e| !e.contains('@')) {
        return Err(AppError::Validation("Invalid email".to_string()));
    }

    match db::update_profile(&state.pool, user.id(), &update).await {
        Ok(Some(profile)) => Ok(HttpResponse::Ok().json(profile)),
        Ok(None) => Err(AppError::NotFound("User not found".to_string())),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::Validation("Email already in use".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[get("/admin/check")]
pub async fn admin_check(
    state: web::Data<AppState>,
    user: web::ReqData<AuthUser>,
) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "isAdmin": state.config.is_admin(user.id()),
        "userId": user.id(),
    }))
}
