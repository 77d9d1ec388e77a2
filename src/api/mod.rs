pub mod auth;
pub mod cart;
pub mod favorites;
pub mod library;
pub mod operator;
pub mod orders;
pub mod payments;
pub mod products;
pub mod razorpay;
pub mod razorpay_client;
pub mod users;
pub mod webhooks_razorpay;

use actix_web::web;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::AppState;

use self::auth::{AuthUser, JwtMiddleware};

/// Registers every route. Public resources carry their full `/api/...` path and
/// are registered before the authenticated `/api` scope so they match first.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(auth::register)
        .service(auth::login)
        .service(products::list_products)
        .service(products::get_product)
        .service(products::list_categories)
        .service(webhooks_razorpay::razorpay_webhook)
        .service(webhooks_razorpay::razorpay_webhook_status)
        .service(crate::ws::push_notifications)
        .service(
            web::scope("/api")
                .wrap(JwtMiddleware)
                .service(users::current_user)
                .service(users::update_profile)
                .service(users::admin_check)
                .service(products::create_product)
                .service(products::update_product)
                .service(products::delete_product)
                .service(products::create_category)
                .service(products::update_category)
                .service(products::delete_category)
                .service(cart::list_cart)
                .service(cart::add_to_cart)
                .service(cart::clear_cart)
                .service(cart::update_cart_item)
                .service(cart::remove_cart_item)
                .service(favorites::list_favorites)
                .service(favorites::add_favorite)
                .service(favorites::is_favorite)
                .service(favorites::remove_favorite)
                .service(orders::create_order)
                .service(orders::list_orders)
                .service(orders::get_order)
                .service(orders::update_order_status)
                .service(orders::add_tracking_event)
                .service(library::check_access)
                .service(library::payment_status)
                .service(library::list_library)
                .service(library::list_payments)
                .service(payments::create_payment_session)
                .service(operator::diagnose_payments)
                .service(operator::sync_payments)
                .service(operator::bulk_reconcile_payments)
                .service(operator::reconcile_razorpay_payments)
                .service(operator::complete_purchase)
                .service(operator::grant_verified_access)
                .service(operator::verify_payment),
        );
}

/// Path ids arrive as strings so that a non-numeric id is a 400, not a 404.
pub(crate) fn parse_id(raw: &str, what: &str) -> AppResult<i32> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| AppError::Validation(format!("Invalid {what} ID")))
}

/// Body for endpoints where the whole payload is optional. An empty body gives
/// the default; anything else has to parse.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))
}

pub(crate) fn require_admin(state: &AppState, user: &AuthUser) -> AppResult<()> {
    if state.config.is_admin(user.id()) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

/// Reconciliation tools answer as disabled unless switched on and called by an admin.
pub(crate) fn require_operator_tools(state: &AppState, user: &AuthUser) -> AppResult<()> {
    if state.config.operator_tools_enabled && state.config.is_admin(user.id()) {
        Ok(())
    } else {
        log::warn!("operator endpoint refused for user_id={}", user.id());
        Err(AppError::Disabled)
    }
}
