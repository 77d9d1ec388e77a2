// src/config.rs

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Razorpay API credentials, used to re-check manually reconciled payments.
#[derive(Debug, Clone)]
pub struct RazorpayKeys {
    pub key_id: String,
    pub key_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub admin_user_ids: Vec<String>,
    /// Serves diagnose/sync/bulk-reconcile to admins. Off means they answer 503.
    pub operator_tools_enabled: bool,
    pub razorpay_webhook_secret: Option<String>,
    pub razorpay_keys: Option<RazorpayKeys>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

        let db_max_connections = match env::var("DB_MAX_CONNECTIONS") {
            Ok(v) => v.parse::<u32>().map_err(|_| ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                value: v,
            })?,
            Err(_) => 20,
        };

        let operator_tools_enabled = match env::var("ENABLE_OPERATOR_TOOLS") {
            Ok(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                name: "ENABLE_OPERATOR_TOOLS",
                value: v,
            })?,
            Err(_) => false,
        };

        let razorpay_keys = match (optional("RAZORPAY_KEY_ID"), optional("RAZORPAY_KEY_SECRET")) {
            (Some(key_id), Some(key_secret)) => Some(RazorpayKeys { key_id, key_secret }),
            _ => None,
        };

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            jwt_secret,
            admin_user_ids: parse_list(&env::var("ADMIN_USER_IDS").unwrap_or_default()),
            operator_tools_enabled,
            razorpay_webhook_secret: optional("RAZORPAY_WEBHOOK_SECRET"),
            razorpay_keys,
        })
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|id| id == user_id)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
