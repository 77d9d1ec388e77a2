// src/api/razorpay.rs

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `data` in lowercase hex, the format of `X-Razorpay-Signature`.
pub fn sign_hmac_sha256_hex(secret: &str, data: &[u8]) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a webhook signature against the raw request body.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Provider amounts are integer minor units (paise); the payments table stores
/// two-decimal major units.
pub fn minor_units_to_decimal(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Largest amount, in minor units, that fits the NUMERIC(10, 2) amount columns.
pub const MAX_AMOUNT_MINOR: i64 = 9_999_999_999;

pub fn amount_is_storable(amount_minor: i64) -> bool {
    (1..=MAX_AMOUNT_MINOR).contains(&amount_minor)
}

/// An id that clients and provider notes send either as a number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexibleId {
    Number(i64),
    Text(String),
}

impl FlexibleId {
    /// Positive ids only; anything else counts as missing.
    pub fn as_positive_i32(&self) -> Option<i32> {
        let n = match self {
            FlexibleId::Number(n) => i32::try_from(*n).ok()?,
            FlexibleId::Text(s) => s.trim().parse::<i32>().ok()?,
        };
        (n > 0).then_some(n)
    }
}

pub struct CustomerPrefill<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
}

/// Appends prefill fields and the `notes[user_id]` / `notes[product_id]`
/// tracking notes that the webhook later reads back.
pub fn build_payment_url(
    payment_link: &str,
    customer: &CustomerPrefill<'_>,
    user_id: &str,
    product_id: i32,
) -> String {
    let product_id = product_id.to_string();
    let query = serde_urlencoded::to_string(vec![
        ("prefill[name]", customer.name),
        ("prefill[email]", customer.email),
        ("prefill[contact]", customer.phone),
        ("notes[user_id]", user_id),
        ("notes[product_id]", product_id.as_str()),
    ])
    .unwrap_or_default();

    let separator = if payment_link.contains('?') { '&' } else { '?' };
    format!("{payment_link}{separator}{query}")
}
