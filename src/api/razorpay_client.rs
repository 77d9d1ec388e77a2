// src/api/razorpay_client.rs
//
// Minimal client for the Razorpay REST API (https://api.razorpay.com).
// Auth: HTTP basic with key id / key secret.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::RazorpayKeys;

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum RazorpayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("razorpay api error status={status} body={body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPayment {
    /// Minor units.
    pub amount: i64,
    pub status: String,
}

impl ProviderPayment {
    pub fn is_captured_for(&self, amount_minor: i64) -> bool {
        self.status == "captured" && self.amount == amount_minor
    }
}

#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    keys: RazorpayKeys,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(keys: RazorpayKeys) -> Result<Self, RazorpayError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            keys,
            base_url: RAZORPAY_API_BASE.to_string(),
        })
    }

    pub async fn fetch_payment(&self, payment_id: &str) -> Result<ProviderPayment, RazorpayError> {
        let resp = self
            .http
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .basic_auth(&self.keys.key_id, Some(&self.keys.key_secret))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(RazorpayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<ProviderPayment>(&body)
            .map_err(|e| RazorpayError::InvalidResponse(format!("{e}; body={body}")))
    }
}
