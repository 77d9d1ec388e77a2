#![allow(dead_code)]

use actix::Actor;
use sqlx::{PgPool, Row};
use std::env;
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};

use storefront::AppState;
use storefront::api::auth::generate_jwt;
use storefront::config::Config;
use storefront::ws::WsHub;

pub const JWT_SECRET: &str = "test-secret";
pub const ADMIN_ID: &str = "admin-1";

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Recreates the database named by `TEST_DATABASE_URL` and runs migrations.
pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) =
        split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url)
        .await
        .expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    if let Err(e) = sqlx::query(&create_sql).execute(&admin_pool).await {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url)
        .await
        .expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    TestDb { pool, _guard: guard }
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        bind_addr: "127.0.0.1:0".to_string(),
        db_max_connections: 5,
        jwt_secret: JWT_SECRET.to_string(),
        admin_user_ids: vec![ADMIN_ID.to_string()],
        operator_tools_enabled: true,
        razorpay_webhook_secret: None,
        razorpay_keys: None,
    }
}

/// Must run inside an actix system (`#[actix_web::test]`) for the hub to start.
pub fn build_state(pool: PgPool, config: Config) -> AppState {
    AppState {
        pool,
        config,
        ws_hub: WsHub::new().start(),
        razorpay: None,
    }
}

pub fn bearer(user_id: &str) -> (&'static str, String) {
    let token = generate_jwt(JWT_SECRET, user_id).expect("jwt");
    ("Authorization", format!("Bearer {token}"))
}

pub async fn insert_user(pool: &PgPool, id: &str) {
    sqlx::query("INSERT INTO users (id, email, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("{id}@example.com"))
        .bind(format!("User {id}"))
        .execute(pool)
        .await
        .expect("insert user");
}

pub async fn insert_product(pool: &PgPool, name: &str, price: &str, razorpay_link: Option<&str>) -> i32 {
    sqlx::query(
        r#"INSERT INTO products (name, brand, price, category, image_url, razorpay_link)
           VALUES ($1, 'Acme', $2::numeric, 'courses', 'https://img.example/1.png', $3)
           RETURNING id"#,
    )
    .bind(name)
    .bind(price)
    .bind(razorpay_link)
    .fetch_one(pool)
    .await
    .expect("insert product")
    .get("id")
}

pub async fn insert_payment(
    pool: &PgPool,
    payment_id: &str,
    user_id: &str,
    product_id: i32,
    status: &str,
    method: &str,
) {
    sqlx::query(
        r#"INSERT INTO payments (payment_id, user_id, product_id, amount, status, payment_method)
           VALUES ($1, $2, $3, 99.00, $4, $5)"#,
    )
    .bind(payment_id)
    .bind(user_id)
    .bind(product_id)
    .bind(status)
    .bind(method)
    .execute(pool)
    .await
    .expect("insert payment");
}

pub async fn insert_library_row(pool: &PgPool, user_id: &str, product_id: i32) {
    sqlx::query("INSERT INTO library (user_id, product_id, access_granted) VALUES ($1, $2, true)")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await
        .expect("insert library row");
}

pub async fn count_rows(pool: &PgPool, table: &str, user_id: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table} WHERE user_id = $1"))
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("count rows")
        .get("n")
}
