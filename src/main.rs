// src/main.rs
use actix::Actor;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use storefront::api::razorpay_client::RazorpayClient;
use storefront::config::Config;
use storefront::ws::WsHub;
use storefront::{AppState, api, docs};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        log::error!("configuration error: {e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    if config.razorpay_webhook_secret.is_none() {
        log::warn!("RAZORPAY_WEBHOOK_SECRET not set; webhook signatures are not checked");
    }
    if config.operator_tools_enabled {
        log::warn!("operator reconciliation tools are enabled");
    }

    let razorpay = config
        .razorpay_keys
        .clone()
        .map(RazorpayClient::new)
        .transpose()
        .map_err(|e| {
            log::error!("razorpay client error: {e}");
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
    let bind_addr = config.bind_addr.clone();

    let state = web::Data::new(AppState {
        pool,
        config,
        ws_hub: WsHub::new().start(),
        razorpay,
    });

    log::info!("listening on {bind_addr}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
