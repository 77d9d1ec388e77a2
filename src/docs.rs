use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::webhooks_razorpay::razorpay_webhook,
        crate::api::library::check_access,
        crate::api::library::list_library,
        crate::api::payments::create_payment_session
    ),
    components(
        schemas(
            crate::api::auth::RegisterRequest,
            crate::api::auth::LoginRequest,
            crate::api::auth::AuthResponse,
            crate::api::webhooks_razorpay::RazorpayWebhook,
            crate::api::webhooks_razorpay::WebhookPayload,
            crate::api::webhooks_razorpay::PaymentWrapper,
            crate::api::webhooks_razorpay::PaymentEntity,
            crate::api::library::AccessResponse,
            crate::api::payments::CustomerDetails,
            crate::api::payments::CreatePaymentSessionRequest,
            crate::api::payments::PaymentSessionResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "library", description = "Purchased content and access checks"),
        (name = "payments", description = "Payment links"),
        (name = "webhooks", description = "Callbacks from Razorpay")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/webhook/razorpay"));
        assert!(doc.paths.paths.contains_key("/auth/login"));
        assert_eq!(doc.paths.paths.len(), 6);
    }
}
