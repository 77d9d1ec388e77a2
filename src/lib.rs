pub mod api;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod library;
pub mod models;
pub mod reconcile;
pub mod ws;

use actix::Addr;
use sqlx::PgPool;

use crate::api::razorpay_client::RazorpayClient;
use crate::config::Config;
use crate::ws::WsHub;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub ws_hub: Addr<WsHub>,
    /// Present only when Razorpay API keys are configured.
    pub razorpay: Option<RazorpayClient>,
}
