// src/library.rs
//
// Library access is only real when two rows agree: a library entry with
// `access_granted` and a completed payment confirmed by the provider webhook.
// Every read here re-derives access from both, never from the library row alone.

use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool, Row};
use thiserror::Error;

use crate::db::{self, NewPayment};
use crate::models::{
    LibraryEntry, LibraryItem, Payment, PAYMENT_METHOD_WEBHOOK_VERIFIED, PAYMENT_STATUS_COMPLETED,
    PAYMENT_STATUS_PENDING,
};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Cannot add to library: no completed payment found for this product")]
    NoCompletedPayment,

    #[error("Library access already exists for this product")]
    AlreadyInLibrary,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Access state of one (user, product) pair. There is no way back from `Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    NoPayment,
    /// A payment row exists but access is not (yet) established.
    Pending,
    Verified,
}

impl AccessStatus {
    pub fn from_parts(has_any_payment: bool, verified_payment: bool, library_access: bool) -> Self {
        if verified_payment && library_access {
            AccessStatus::Verified
        } else if has_any_payment {
            AccessStatus::Pending
        } else {
            AccessStatus::NoPayment
        }
    }
}

fn entry_from_row(r: &PgRow) -> LibraryEntry {
    LibraryEntry {
        id: r.get("id"),
        user_id: r.get("user_id"),
        product_id: r.get("product_id"),
        access_granted: r.get("access_granted"),
        purchase_date: r.get("purchase_date"),
        created_at: r.get("created_at"),
    }
}

pub async fn count_verified_payments<'e, E: PgExecutor<'e>>(
    exec: E,
    user_id: &str,
    product_id: i32,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS n
           FROM payments
           WHERE user_id = $1 AND product_id = $2
             AND status = $3 AND payment_method = $4"#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(PAYMENT_STATUS_COMPLETED)
    .bind(PAYMENT_METHOD_WEBHOOK_VERIFIED)
    .fetch_one(exec)
    .await?;
    Ok(row.get("n"))
}

pub async fn has_verified_payment<'e, E: PgExecutor<'e>>(
    exec: E,
    user_id: &str,
    product_id: i32,
) -> Result<bool, sqlx::Error> {
    Ok(count_verified_payments(exec, user_id, product_id).await? > 0)
}

pub async fn has_library_grant<'e, E: PgExecutor<'e>>(
    exec: E,
    user_id: &str,
    product_id: i32,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT EXISTS(
               SELECT 1 FROM library
               WHERE user_id = $1 AND product_id = $2 AND access_granted = true
           ) AS present"#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(exec)
    .await?;
    Ok(row.get("present"))
}

async fn library_row_exists<'e, E: PgExecutor<'e>>(
    exec: E,
    user_id: &str,
    product_id: i32,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM library WHERE user_id = $1 AND product_id = $2) AS present",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(exec)
    .await?;
    Ok(row.get("present"))
}

/// True only when both a verified payment and a granted library row exist.
pub async fn has_access(pool: &PgPool, user_id: &str, product_id: i32) -> Result<bool, sqlx::Error> {
    let paid = has_verified_payment(pool, user_id, product_id).await?;
    let granted = has_library_grant(pool, user_id, product_id).await?;
    Ok(paid && granted)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusReport {
    pub product_id: i32,
    pub has_verified_payment: bool,
    pub has_access: bool,
    pub can_access: bool,
    pub verified_payments: i64,
    pub status: AccessStatus,
}

pub async fn payment_status(
    pool: &PgPool,
    user_id: &str,
    product_id: i32,
) -> Result<PaymentStatusReport, sqlx::Error> {
    let verified_payments = count_verified_payments(pool, user_id, product_id).await?;
    let granted = has_library_grant(pool, user_id, product_id).await?;
    let any_payment: bool = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM payments WHERE user_id = $1 AND product_id = $2) AS present",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(pool)
    .await?
    .get("present");

    let has_access = verified_payments > 0 && granted;
    Ok(PaymentStatusReport {
        product_id,
        has_verified_payment: verified_payments > 0,
        has_access,
        can_access: has_access,
        verified_payments,
        status: AccessStatus::from_parts(any_payment, verified_payments > 0, granted),
    })
}

/// Products the user may open, newest purchase first. Library rows without a
/// verified payment are left out.
pub async fn list_library(pool: &PgPool, user_id: &str) -> Result<Vec<LibraryItem>, sqlx::Error> {
    let sql = format!(
        r#"SELECT l.id, l.user_id, l.product_id, l.access_granted, l.purchase_date, l.created_at,
                  {}
           FROM library l
           JOIN products p ON p.id = l.product_id
           WHERE l.user_id = $1
             AND l.access_granted = true
             AND EXISTS (
                 SELECT 1 FROM payments pay
                 WHERE pay.user_id = l.user_id
                   AND pay.product_id = l.product_id
                   AND pay.status = $2
                   AND pay.payment_method = $3
             )
           ORDER BY l.purchase_date DESC, l.id DESC"#,
        db::PRODUCT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(PAYMENT_STATUS_COMPLETED)
        .bind(PAYMENT_METHOD_WEBHOOK_VERIFIED)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|r| LibraryItem {
            entry: entry_from_row(r),
            product: db::product_from_row(r),
        })
        .collect())
}

/// Every library row of the user, regardless of payment state.
pub async fn list_library_rows<'e, E: PgExecutor<'e>>(
    exec: E,
    user_id: &str,
) -> Result<Vec<LibraryEntry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, user_id, product_id, access_granted, purchase_date, created_at
           FROM library
           WHERE user_id = $1
           ORDER BY purchase_date DESC, id DESC"#,
    )
    .bind(user_id)
    .fetch_all(exec)
    .await?;
    Ok(rows.iter().map(entry_from_row).collect())
}

/// Inserts a library row. Refuses without a verified payment for the pair and
/// refuses when a row already exists; it never upserts.
pub async fn add_to_library(
    conn: &mut PgConnection,
    user_id: &str,
    product_id: i32,
) -> Result<LibraryEntry, LibraryError> {
    if !has_verified_payment(&mut *conn, user_id, product_id).await? {
        return Err(LibraryError::NoCompletedPayment);
    }

    if library_row_exists(&mut *conn, user_id, product_id).await? {
        return Err(LibraryError::AlreadyInLibrary);
    }

    let row = sqlx::query(
        r#"INSERT INTO library (user_id, product_id, access_granted, purchase_date)
           VALUES ($1, $2, true, NOW())
           ON CONFLICT (user_id, product_id) DO NOTHING
           RETURNING id, user_id, product_id, access_granted, purchase_date, created_at"#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref()
        .map(entry_from_row)
        .ok_or(LibraryError::AlreadyInLibrary)
}

#[derive(Debug)]
pub enum GrantOutcome {
    Granted {
        payment: Payment,
        /// `None` when the user already had a library row for the product.
        entry: Option<LibraryEntry>,
    },
    Duplicate,
}

/// Records a provider-confirmed payment and grants library access in one
/// transaction. A payment id seen before is reported as `Duplicate` unless the
/// stored row is still pending for the same user and product, in which case it
/// is promoted.
pub async fn record_payment_and_grant(
    pool: &PgPool,
    payment: &NewPayment<'_>,
) -> Result<GrantOutcome, LibraryError> {
    let mut tx = pool.begin().await?;

    let stored = match db::find_payment_by_external_id(&mut *tx, payment.payment_id).await? {
        Some(existing) => {
            let promotable = existing.status == PAYMENT_STATUS_PENDING
                && existing.user_id == payment.user_id
                && existing.product_id == payment.product_id;
            if !promotable {
                tx.rollback().await?;
                return Ok(GrantOutcome::Duplicate);
            }
            db::complete_pending_payment(&mut *tx, payment).await?
        }
        None => db::insert_payment(&mut *tx, payment).await?,
    };

    let Some(stored) = stored else {
        // Lost a race against a concurrent delivery of the same id.
        tx.rollback().await?;
        return Ok(GrantOutcome::Duplicate);
    };

    let entry = if library_row_exists(&mut *tx, payment.user_id, payment.product_id).await? {
        None
    } else {
        match add_to_library(&mut *tx, payment.user_id, payment.product_id).await {
            Ok(entry) => Some(entry),
            Err(LibraryError::AlreadyInLibrary) => None,
            Err(e) => return Err(e),
        }
    };

    tx.commit().await?;
    Ok(GrantOutcome::Granted {
        payment: stored,
        entry,
    })
}
