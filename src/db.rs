// src/db.rs

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};

use crate::models::{
    CartItem, CartLine, Category, Favorite, FavoriteLine, Order, OrderDetail, OrderItem,
    OrderStatus, Payment, Product, ProductInput, TrackingEvent, User,
};

pub(crate) const PRODUCT_COLUMNS: &str = r#"p.id AS p_id, p.name AS p_name, p.brand AS p_brand,
    p.description AS p_description, p.price::text AS p_price,
    p.original_price::text AS p_original_price, p.category AS p_category,
    p.image_url AS p_image_url, p.demo_link AS p_demo_link, p.access_link AS p_access_link,
    p.razorpay_link AS p_razorpay_link, p.rating::text AS p_rating,
    p.review_count AS p_review_count, p.view_count AS p_view_count,
    p.sold_count AS p_sold_count, p.in_stock AS p_in_stock,
    p.is_high_demand AS p_is_high_demand, p.has_instant_access AS p_has_instant_access,
    p.created_at AS p_created_at, p.updated_at AS p_updated_at"#;

const USER_COLUMNS: &str = r#"id, name, email, phone, first_name, last_name, profile_image_url,
    instagram_link, sign_up_time, created_at, updated_at"#;

const ORDER_COLUMNS: &str = r#"id, user_id, total_amount::text AS total_amount, status,
    tracking_number, shipping_carrier, estimated_delivery, shipped_at, delivered_at,
    shipping_address, tracking_url, created_at, updated_at"#;

const TRACKING_COLUMNS: &str = r#"id, order_id, tracking_number, carrier, status, location,
    description, event_time, estimated_delivery, created_at"#;

pub(crate) const PAYMENT_COLUMNS: &str = r#"id, payment_id, user_id, product_id, razorpay_link_used,
    amount::text AS amount, date_time, status, payment_method, issue_notes, created_at, updated_at"#;

/// Maps a row selected with [`PRODUCT_COLUMNS`].
pub(crate) fn product_from_row(r: &PgRow) -> Product {
    Product {
        id: r.get("p_id"),
        name: r.get("p_name"),
        brand: r.get("p_brand"),
        description: r.get("p_description"),
        price: r.get("p_price"),
        original_price: r.get("p_original_price"),
        category: r.get("p_category"),
        image_url: r.get("p_image_url"),
        demo_link: r.get("p_demo_link"),
        access_link: r.get("p_access_link"),
        razorpay_link: r.get("p_razorpay_link"),
        rating: r.get("p_rating"),
        review_count: r.get("p_review_count"),
        view_count: r.get("p_view_count"),
        sold_count: r.get("p_sold_count"),
        in_stock: r.get("p_in_stock"),
        is_high_demand: r.get("p_is_high_demand"),
        has_instant_access: r.get("p_has_instant_access"),
        created_at: r.get("p_created_at"),
        updated_at: r.get("p_updated_at"),
    }
}

fn user_from_row(r: &PgRow) -> User {
    User {
        id: r.get("id"),
        name: r.get("name"),
        email: r.get("email"),
        phone: r.get("phone"),
        first_name: r.get("first_name"),
        last_name: r.get("last_name"),
        profile_image_url: r.get("profile_image_url"),
        instagram_link: r.get("instagram_link"),
        sign_up_time: r.get("sign_up_time"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn order_from_row(r: &PgRow) -> Order {
    Order {
        id: r.get("id"),
        user_id: r.get("user_id"),
        total_amount: r.get("total_amount"),
        status: r.get("status"),
        tracking_number: r.get("tracking_number"),
        shipping_carrier: r.get("shipping_carrier"),
        estimated_delivery: r.get("estimated_delivery"),
        shipped_at: r.get("shipped_at"),
        delivered_at: r.get("delivered_at"),
        shipping_address: r.get("shipping_address"),
        tracking_url: r.get("tracking_url"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn order_item_from_row(r: &PgRow) -> OrderItem {
    OrderItem {
        id: r.get("id"),
        order_id: r.get("order_id"),
        product_id: r.get("product_id"),
        quantity: r.get("quantity"),
        price: r.get("price"),
        created_at: r.get("created_at"),
    }
}

fn tracking_from_row(r: &PgRow) -> TrackingEvent {
    TrackingEvent {
        id: r.get("id"),
        order_id: r.get("order_id"),
        tracking_number: r.get("tracking_number"),
        carrier: r.get("carrier"),
        status: r.get("status"),
        location: r.get("location"),
        description: r.get("description"),
        event_time: r.get("event_time"),
        estimated_delivery: r.get("estimated_delivery"),
        created_at: r.get("created_at"),
    }
}

pub(crate) fn payment_from_row(r: &PgRow) -> Payment {
    Payment {
        id: r.get("id"),
        payment_id: r.get("payment_id"),
        user_id: r.get("user_id"),
        product_id: r.get("product_id"),
        razorpay_link_used: r.get("razorpay_link_used"),
        amount: r.get("amount"),
        date_time: r.get("date_time"),
        status: r.get("status"),
        payment_method: r.get("payment_method"),
        issue_notes: r.get("issue_notes"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

// ---------------------------------------------------------------------------
// Users

pub async fn create_user(
    pool: &PgPool,
    id: &str,
    email: &str,
    name: Option<&str>,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    let sql = format!(
        r#"INSERT INTO users (id, email, name, password_hash)
           VALUES ($1, $2, $3, $4)
           RETURNING {USER_COLUMNS}"#
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_one(pool)
        .await?;
    Ok(user_from_row(&row))
}

/// Returns `(user_id, password_hash)` for login.
pub async fn find_credentials(
    pool: &PgPool,
    email: &str,
) -> Result<Option<(String, Option<String>)>, sqlx::Error> {
    let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| (r.get("id"), r.get("password_hash"))))
}

pub async fn get_user(pool: &PgPool, id: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(user_from_row))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub profile_image_url: Option<String>,
    pub instagram_link: Option<String>,
}

pub async fn update_profile(
    pool: &PgPool,
    id: &str,
    data: &ProfileUpdate,
) -> Result<Option<User>, sqlx::Error> {
    let sql = format!(
        r#"UPDATE users
           SET first_name = $2, last_name = $3,
               email = COALESCE($4, email), phone = $5,
               profile_image_url = $6, instagram_link = $7,
               name = NULLIF(TRIM(CONCAT_WS(' ', $2::varchar, $3::varchar)), ''),
               updated_at = NOW()
           WHERE id = $1
           RETURNING {USER_COLUMNS}"#
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(data.first_name.as_deref())
        .bind(data.last_name.as_deref())
        .bind(data.email.as_deref())
        .bind(data.phone.as_deref())
        .bind(data.profile_image_url.as_deref())
        .bind(data.instagram_link.as_deref())
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(user_from_row))
}

// ---------------------------------------------------------------------------
// Catalog

/// `category` values `all` and `all-products` mean no filter.
pub fn normalize_category(category: Option<&str>) -> Option<&str> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty() && *c != "all" && *c != "all-products")
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub async fn list_products(
    pool: &PgPool,
    category: Option<&str>,
    search: Option<&str>,
) -> Result<Vec<Product>, sqlx::Error> {
    let category = normalize_category(category);
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern);

    let sql = format!(
        r#"SELECT {PRODUCT_COLUMNS}
           FROM products p
           WHERE ($1::text IS NULL OR p.category = $1)
             AND ($2::text IS NULL OR p.name ILIKE $2)
           ORDER BY p.created_at DESC, p.id DESC"#
    );
    let rows = sqlx::query(&sql)
        .bind(category)
        .bind(pattern)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(product_from_row).collect())
}

pub async fn get_product<'e, E: PgExecutor<'e>>(
    exec: E,
    id: i32,
) -> Result<Option<Product>, sqlx::Error> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1");
    let row = sqlx::query(&sql).bind(id).fetch_optional(exec).await?;
    Ok(row.as_ref().map(product_from_row))
}

pub async fn increment_view_count(pool: &PgPool, id: i32) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE products SET view_count = view_count + 1 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_product(pool: &PgPool, input: &ProductInput) -> Result<Product, sqlx::Error> {
    let sql = format!(
        r#"INSERT INTO products AS p
               (name, brand, description, price, original_price, category, image_url,
                demo_link, access_link, razorpay_link, in_stock, is_high_demand, has_instant_access)
           VALUES ($1, $2, $3, $4::numeric, $5::numeric, $6, $7, $8, $9, $10, $11, $12, $13)
           RETURNING {PRODUCT_COLUMNS}"#
    );
    let row = bind_product(sqlx::query(&sql), input).fetch_one(pool).await?;
    Ok(product_from_row(&row))
}

pub async fn update_product(
    pool: &PgPool,
    id: i32,
    input: &ProductInput,
) -> Result<Option<Product>, sqlx::Error> {
    let sql = format!(
        r#"UPDATE products AS p
           SET name = $1, brand = $2, description = $3, price = $4::numeric,
               original_price = $5::numeric, category = $6, image_url = $7,
               demo_link = $8, access_link = $9, razorpay_link = $10,
               in_stock = $11, is_high_demand = $12, has_instant_access = $13,
               updated_at = NOW()
           WHERE p.id = $14
           RETURNING {PRODUCT_COLUMNS}"#
    );
    let row = bind_product(sqlx::query(&sql), input)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(product_from_row))
}

fn bind_product<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    input: &'q ProductInput,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(&input.name)
        .bind(&input.brand)
        .bind(input.description.as_deref())
        .bind(&input.price)
        .bind(input.original_price.as_deref())
        .bind(&input.category)
        .bind(&input.image_url)
        .bind(input.demo_link.as_deref())
        .bind(input.access_link.as_deref())
        .bind(input.razorpay_link.as_deref())
        .bind(input.in_stock)
        .bind(input.is_high_demand)
        .bind(input.has_instant_access)
}

pub async fn delete_product(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn category_from_row(r: &PgRow) -> Category {
    Category {
        id: r.get("id"),
        name: r.get("name"),
        description: r.get("description"),
        icon: r.get("icon"),
        is_active: r.get("is_active"),
        created_at: r.get("created_at"),
    }
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<Category>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, name, description, icon, is_active, created_at
           FROM categories
           WHERE is_active = true
           ORDER BY name ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| category_from_row(&r))
        .collect())
}

pub async fn create_category(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
    icon: Option<&str>,
) -> Result<Category, sqlx::Error> {
    let r = sqlx::query(
        r#"INSERT INTO categories (name, description, icon)
           VALUES ($1, $2, $3)
           RETURNING id, name, description, icon, is_active, created_at"#,
    )
    .bind(name)
    .bind(description)
    .bind(icon)
    .fetch_one(pool)
    .await?;

    Ok(category_from_row(&r))
}

/// Partial update; `None` keeps the stored value.
pub async fn update_category(
    pool: &PgPool,
    id: i32,
    name: Option<&str>,
    description: Option<&str>,
    icon: Option<&str>,
) -> Result<Option<Category>, sqlx::Error> {
    let row = sqlx::query(
        r#"UPDATE categories
           SET name = COALESCE($2, name),
               description = COALESCE($3, description),
               icon = COALESCE($4, icon),
               updated_at = NOW()
           WHERE id = $1
           RETURNING id, name, description, icon, is_active, created_at"#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(icon)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(category_from_row))
}

/// Soft delete: the row stays, it just drops out of the public listing.
pub async fn deactivate_category(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE categories SET is_active = false, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Cart

fn cart_item_from_row(r: &PgRow) -> CartItem {
    CartItem {
        id: r.get("id"),
        user_id: r.get("user_id"),
        product_id: r.get("product_id"),
        quantity: r.get("quantity"),
        created_at: r.get("created_at"),
    }
}

pub async fn list_cart(pool: &PgPool, user_id: &str) -> Result<Vec<CartLine>, sqlx::Error> {
    let sql = format!(
        r#"SELECT c.id, c.user_id, c.product_id, c.quantity, c.created_at, {PRODUCT_COLUMNS}
           FROM cart_items c
           JOIN products p ON p.id = c.product_id
           WHERE c.user_id = $1
           ORDER BY c.created_at ASC, c.id ASC"#
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|r| CartLine {
            item: cart_item_from_row(r),
            product: product_from_row(r),
        })
        .collect())
}

/// Adding a product already in the cart increments its quantity.
/// Per-line ceiling; merged adds saturate here.
pub const MAX_CART_QUANTITY: i32 = 999;

pub async fn add_to_cart(
    pool: &PgPool,
    user_id: &str,
    product_id: i32,
    quantity: i32,
) -> Result<CartItem, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO cart_items (user_id, product_id, quantity)
           VALUES ($1, $2, $3)
           ON CONFLICT (user_id, product_id)
           DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $4)
           RETURNING id, user_id, product_id, quantity, created_at"#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .bind(MAX_CART_QUANTITY)
    .fetch_one(pool)
    .await?;

    Ok(cart_item_from_row(&row))
}

pub async fn update_cart_item(
    pool: &PgPool,
    user_id: &str,
    id: i32,
    quantity: i32,
) -> Result<Option<CartItem>, sqlx::Error> {
    let row = sqlx::query(
        r#"UPDATE cart_items SET quantity = $3
           WHERE id = $1 AND user_id = $2
           RETURNING id, user_id, product_id, quantity, created_at"#,
    )
    .bind(id)
    .bind(user_id)
    .bind(quantity)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(cart_item_from_row))
}

pub async fn remove_cart_item(pool: &PgPool, user_id: &str, id: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_cart<'e, E: PgExecutor<'e>>(exec: E, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user_id)
        .execute(exec)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Favorites

pub async fn list_favorites(pool: &PgPool, user_id: &str) -> Result<Vec<FavoriteLine>, sqlx::Error> {
    let sql = format!(
        r#"SELECT f.id, f.user_id, f.product_id, f.created_at, {PRODUCT_COLUMNS}
           FROM favorites f
           JOIN products p ON p.id = f.product_id
           WHERE f.user_id = $1
           ORDER BY f.created_at DESC"#
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|r| FavoriteLine {
            favorite: Favorite {
                id: r.get("id"),
                user_id: r.get("user_id"),
                product_id: r.get("product_id"),
                created_at: r.get("created_at"),
            },
            product: product_from_row(r),
        })
        .collect())
}

pub async fn add_favorite(
    pool: &PgPool,
    user_id: &str,
    product_id: i32,
) -> Result<Favorite, sqlx::Error> {
    // The no-op update makes RETURNING yield the existing row on conflict.
    let r = sqlx::query(
        r#"INSERT INTO favorites (user_id, product_id)
           VALUES ($1, $2)
           ON CONFLICT (user_id, product_id) DO UPDATE SET user_id = EXCLUDED.user_id
           RETURNING id, user_id, product_id, created_at"#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(pool)
    .await?;

    Ok(Favorite {
        id: r.get("id"),
        user_id: r.get("user_id"),
        product_id: r.get("product_id"),
        created_at: r.get("created_at"),
    })
}

pub async fn remove_favorite(pool: &PgPool, user_id: &str, product_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn is_favorite(pool: &PgPool, user_id: &str, product_id: i32) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND product_id = $2) AS present",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("present"))
}

// ---------------------------------------------------------------------------
// Orders

/// Checks out the user's cart. Unit prices are copied from the catalog at this
/// moment and never re-read afterwards. Returns `None` when the cart is empty.
pub async fn create_order_from_cart(
    pool: &PgPool,
    user_id: &str,
    shipping_address: Option<serde_json::Value>,
) -> Result<Option<OrderDetail>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let order_id: i32 = sqlx::query(
        r#"INSERT INTO orders (user_id, total_amount, status, shipping_address)
           VALUES ($1, 0, 'pending', $2)
           RETURNING id"#,
    )
    .bind(user_id)
    .bind(shipping_address)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    let item_rows = sqlx::query(
        r#"INSERT INTO order_items (order_id, product_id, quantity, price)
           SELECT $1, c.product_id, c.quantity, p.price
           FROM cart_items c
           JOIN products p ON p.id = c.product_id
           WHERE c.user_id = $2
           RETURNING id, order_id, product_id, quantity, price::text AS price, created_at"#,
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    if item_rows.is_empty() {
        tx.rollback().await?;
        return Ok(None);
    }

    let sql = format!(
        r#"UPDATE orders
           SET total_amount = (SELECT SUM(price * quantity) FROM order_items WHERE order_id = $1)
           WHERE id = $1
           RETURNING {ORDER_COLUMNS}"#
    );
    let order_row = sqlx::query(&sql).bind(order_id).fetch_one(&mut *tx).await?;

    clear_cart(&mut *tx, user_id).await?;
    tx.commit().await?;

    Ok(Some(OrderDetail {
        order: order_from_row(&order_row),
        items: item_rows.iter().map(order_item_from_row).collect(),
        tracking: Vec::new(),
    }))
}

pub async fn list_orders(pool: &PgPool, user_id: &str) -> Result<Vec<Order>, sqlx::Error> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    Ok(rows.iter().map(order_from_row).collect())
}

pub async fn get_order(pool: &PgPool, id: i32) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(order_from_row))
}

pub async fn get_order_detail(pool: &PgPool, id: i32) -> Result<Option<OrderDetail>, sqlx::Error> {
    let Some(order) = get_order(pool, id).await? else {
        return Ok(None);
    };

    let items = sqlx::query(
        r#"SELECT id, order_id, product_id, quantity, price::text AS price, created_at
           FROM order_items
           WHERE order_id = $1
           ORDER BY id ASC"#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(OrderDetail {
        order,
        items: items.iter().map(order_item_from_row).collect(),
        tracking: tracking_history(pool, id).await?,
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub tracking_url: Option<String>,
}

/// Moves an order to `status`, stamping `shipped_at` / `delivered_at` on those
/// transitions. Tracking fields left as `None` keep their stored value.
pub async fn update_order_status(
    pool: &PgPool,
    id: i32,
    status: OrderStatus,
    tracking: &TrackingUpdate,
) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!(
        r#"UPDATE orders
           SET status = $2,
               tracking_number = COALESCE($3, tracking_number),
               shipping_carrier = COALESCE($4, shipping_carrier),
               estimated_delivery = COALESCE($5, estimated_delivery),
               tracking_url = COALESCE($6, tracking_url),
               shipped_at = CASE WHEN $2 = 'shipped' THEN NOW() ELSE shipped_at END,
               delivered_at = CASE WHEN $2 = 'delivered' THEN NOW() ELSE delivered_at END,
               updated_at = NOW()
           WHERE id = $1
           RETURNING {ORDER_COLUMNS}"#
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(status.as_str())
        .bind(tracking.tracking_number.as_deref())
        .bind(tracking.carrier.as_deref())
        .bind(tracking.estimated_delivery)
        .bind(tracking.tracking_url.as_deref())
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(order_from_row))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEventInput {
    pub tracking_number: String,
    pub carrier: String,
    pub status: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

pub async fn add_tracking_event(
    pool: &PgPool,
    order_id: i32,
    input: &TrackingEventInput,
) -> Result<TrackingEvent, sqlx::Error> {
    let sql = format!(
        r#"INSERT INTO shipment_tracking
               (order_id, tracking_number, carrier, status, location, description,
                event_time, estimated_delivery)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
           RETURNING {TRACKING_COLUMNS}"#
    );
    let row = sqlx::query(&sql)
        .bind(order_id)
        .bind(&input.tracking_number)
        .bind(&input.carrier)
        .bind(&input.status)
        .bind(input.location.as_deref())
        .bind(input.description.as_deref())
        .bind(input.event_time.unwrap_or_else(Utc::now))
        .bind(input.estimated_delivery)
        .fetch_one(pool)
        .await?;
    Ok(tracking_from_row(&row))
}

pub async fn tracking_history(pool: &PgPool, order_id: i32) -> Result<Vec<TrackingEvent>, sqlx::Error> {
    let sql = format!(
        "SELECT {TRACKING_COLUMNS} FROM shipment_tracking WHERE order_id = $1 ORDER BY event_time DESC"
    );
    let rows = sqlx::query(&sql).bind(order_id).fetch_all(pool).await?;
    Ok(rows.iter().map(tracking_from_row).collect())
}

/// `CZ` + base36 milliseconds + six random characters, all uppercase.
pub fn generate_tracking_number() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let random: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("CZ{}{}", to_base36(millis), random.to_ascii_uppercase())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Payments

pub async fn list_user_payments<'e, E: PgExecutor<'e>>(
    exec: E,
    user_id: &str,
) -> Result<Vec<Payment>, sqlx::Error> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(exec).await?;
    Ok(rows.iter().map(payment_from_row).collect())
}

pub async fn find_payment_by_external_id<'e, E: PgExecutor<'e>>(
    exec: E,
    payment_id: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1");
    let row = sqlx::query(&sql).bind(payment_id).fetch_optional(exec).await?;
    Ok(row.as_ref().map(payment_from_row))
}

pub struct NewPayment<'a> {
    pub payment_id: &'a str,
    pub user_id: &'a str,
    pub product_id: i32,
    /// Decimal string in major units.
    pub amount: &'a str,
    pub status: &'a str,
    pub payment_method: &'a str,
    pub razorpay_link_used: Option<&'a str>,
    pub issue_notes: Option<String>,
}

/// Inserts a payment unless its external id is already taken; `None` means the
/// id was claimed first by someone else.
pub async fn insert_payment<'e, E: PgExecutor<'e>>(
    exec: E,
    p: &NewPayment<'_>,
) -> Result<Option<Payment>, sqlx::Error> {
    let sql = format!(
        r#"INSERT INTO payments
               (payment_id, user_id, product_id, amount, status, payment_method,
                razorpay_link_used, issue_notes)
           VALUES ($1, $2, $3, $4::numeric, $5, $6, $7, $8)
           ON CONFLICT (payment_id) DO NOTHING
           RETURNING {PAYMENT_COLUMNS}"#
    );
    let row = sqlx::query(&sql)
        .bind(p.payment_id)
        .bind(p.user_id)
        .bind(p.product_id)
        .bind(p.amount)
        .bind(p.status)
        .bind(p.payment_method)
        .bind(p.razorpay_link_used)
        .bind(p.issue_notes.as_deref())
        .fetch_optional(exec)
        .await?;
    Ok(row.as_ref().map(payment_from_row))
}

/// Promotes a `pending` row to the verified state. Rows in any other status are
/// left alone and `None` is returned.
pub async fn complete_pending_payment<'e, E: PgExecutor<'e>>(
    exec: E,
    p: &NewPayment<'_>,
) -> Result<Option<Payment>, sqlx::Error> {
    let sql = format!(
        r#"UPDATE payments
           SET status = $2, payment_method = $3, amount = $4::numeric,
               issue_notes = COALESCE($5, issue_notes), updated_at = NOW()
           WHERE payment_id = $1 AND status = 'pending'
           RETURNING {PAYMENT_COLUMNS}"#
    );
    let row = sqlx::query(&sql)
        .bind(p.payment_id)
        .bind(p.status)
        .bind(p.payment_method)
        .bind(p.amount)
        .bind(p.issue_notes.as_deref())
        .fetch_optional(exec)
        .await?;
    Ok(row.as_ref().map(payment_from_row))
}
