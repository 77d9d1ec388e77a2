// src/api/auth.rs

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{post, web, Error, HttpMessage, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::task::{Context, Poll};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{db, AppState};

const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Authenticated caller, placed in request extensions by [`JwtMiddleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
}

fn invalid_credentials() -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "error": "invalid credentials"
    }))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered", body = AuthResponse),
        (status = 400, description = "Invalid data or user exists")
    )
)]
#[post("/auth/register")]
pub async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> impl Responder {
    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') || payload.password.len() < 6 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "valid email and a password of at least 6 characters are required"
        }));
    }

    let password_hash = match hash(&payload.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            log::error!("bcrypt hash error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let user_id = Uuid::new_v4().to_string();
    let name = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if let Err(e) = db::create_user(&state.pool, &user_id, &email, name, &password_hash).await {
        log::warn!("register db error: {e}");
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "user already exists or invalid data"
        }));
    }

    match generate_jwt(&state.config.jwt_secret, &user_id) {
        Ok(token) => HttpResponse::Ok().json(AuthResponse { token, user_id }),
        Err(e) => {
            log::error!("jwt encode error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
#[post("/auth/login")]
pub async fn login(state: web::Data<AppState>, payload: web::Json<LoginRequest>) -> impl Responder {
    let email = payload.email.trim().to_lowercase();
    let credentials = match db::find_credentials(&state.pool, &email).await {
        Ok(c) => c,
        Err(e) => {
            log::error!("login db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // Accounts created without a password cannot log in here.
    let Some((user_id, Some(password_hash))) = credentials else {
        return invalid_credentials();
    };

    match verify(&payload.password, &password_hash) {
        Ok(true) => {}
        Ok(false) => return invalid_credentials(),
        Err(e) => {
            log::error!("bcrypt verify error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match generate_jwt(&state.config.jwt_secret, &user_id) {
        Ok(token) => HttpResponse::Ok().json(AuthResponse { token, user_id }),
        Err(e) => {
            log::error!("jwt encode error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn generate_jwt(secret: &str, user_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validates a token and returns the user id it was issued for.
pub fn decode_user_id(secret: &str, token: &str) -> Result<String, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
}

/// Requires `Authorization: Bearer <jwt>` signed with the configured secret and
/// puts an [`AuthUser`] into the request extensions.
pub struct JwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtMiddlewareInner<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareInner { service }))
    }
}

pub struct JwtMiddlewareInner<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareInner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(secret) = req
            .app_data::<web::Data<AppState>>()
            .map(|state| state.config.jwt_secret.clone())
        else {
            return Box::pin(async move {
                Err(actix_web::error::ErrorInternalServerError(
                    "application state not configured",
                ))
            });
        };

        let token = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);

        let Some(token) = token else {
            return Box::pin(async move {
                Err(actix_web::error::ErrorUnauthorized(
                    "Missing or invalid Authorization header",
                ))
            });
        };

        match decode_user_id(&secret, &token) {
            Ok(user_id) => {
                req.extensions_mut().insert(AuthUser(user_id));
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(_) => Box::pin(async move { Err(actix_web::error::ErrorUnauthorized("Invalid token")) }),
        }
    }
}
