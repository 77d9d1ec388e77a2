// src/reconcile.rs
//
// Operator tooling for payments and library rows that drifted apart, e.g. a
// payment recorded while its library row is missing.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::api::razorpay::{amount_is_storable, minor_units_to_decimal};
use crate::api::razorpay_client::RazorpayClient;
use crate::db::{self, NewPayment};
use crate::library::{self, GrantOutcome, LibraryError};
use crate::models::{LibraryEntry, Payment, PAYMENT_METHOD_WEBHOOK_VERIFIED, PAYMENT_STATUS_COMPLETED};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisDetails {
    pub payment_records: Vec<Payment>,
    pub library_items: Vec<LibraryEntry>,
    pub discrepancies: Vec<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub user_id: String,
    pub payments: usize,
    pub library_items: usize,
    pub missing_access: usize,
    pub missing_access_product_ids: Vec<i32>,
    pub details: DiagnosisDetails,
}

/// Product ids that appear in `payments` but have no library row, in order of
/// first appearance and without repeats.
pub fn missing_library_products(payments: &[Payment], library: &[LibraryEntry]) -> Vec<i32> {
    let mut missing: Vec<i32> = Vec::new();
    for p in payments {
        let in_library = library.iter().any(|l| l.product_id == p.product_id);
        if !in_library && !missing.contains(&p.product_id) {
            missing.push(p.product_id);
        }
    }
    missing
}

/// Read-only report of a user's payments against their library rows.
pub async fn diagnose(pool: &PgPool, user_id: &str) -> Result<Diagnosis, sqlx::Error> {
    let payments = db::list_user_payments(pool, user_id).await?;
    let library_rows = library::list_library_rows(pool, user_id).await?;
    let missing = missing_library_products(&payments, &library_rows);

    log::info!(
        "diagnose user_id={} payments={} library={} missing={:?}",
        user_id,
        payments.len(),
        library_rows.len(),
        missing
    );

    Ok(Diagnosis {
        user_id: user_id.to_string(),
        payments: payments.len(),
        library_items: library_rows.len(),
        missing_access: missing.len(),
        missing_access_product_ids: missing.clone(),
        details: DiagnosisDetails {
            payment_records: payments,
            library_items: library_rows,
            discrepancies: missing,
        },
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    AccessGranted,
    AlreadyHasAccess,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub payment_id: Option<String>,
    pub product_id: i32,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    fn classify(payment: &Payment, result: Result<LibraryEntry, LibraryError>) -> Self {
        let (status, library_id, error) = match result {
            Ok(entry) => (SyncStatus::AccessGranted, Some(entry.id), None),
            Err(LibraryError::AlreadyInLibrary) => (SyncStatus::AlreadyHasAccess, None, None),
            Err(e) => (SyncStatus::Error, None, Some(e.to_string())),
        };
        Self {
            payment_id: payment.payment_id.clone(),
            product_id: payment.product_id,
            status,
            library_id,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceSyncReport {
    pub diagnosis: Diagnosis,
    pub sync_results: Vec<SyncResult>,
    pub new_access_granted: usize,
}

/// Tries to create the missing library row for every payment of the user.
/// Failures are recorded per payment and never stop the run.
pub async fn force_sync(pool: &PgPool, user_id: &str) -> Result<ForceSyncReport, sqlx::Error> {
    let diagnosis = diagnose(pool, user_id).await?;
    let mut sync_results = Vec::with_capacity(diagnosis.details.payment_records.len());

    for payment in &diagnosis.details.payment_records {
        let outcome = match pool.acquire().await {
            Ok(mut conn) => library::add_to_library(&mut *conn, user_id, payment.product_id).await,
            Err(e) => Err(LibraryError::Database(e)),
        };
        if let Err(e) = &outcome {
            if !matches!(e, LibraryError::AlreadyInLibrary) {
                log::warn!(
                    "force sync failed user_id={} payment_id={:?}: {}",
                    user_id,
                    payment.payment_id,
                    e
                );
            }
        }
        sync_results.push(SyncResult::classify(payment, outcome));
    }

    let new_access_granted = sync_results
        .iter()
        .filter(|r| r.status == SyncStatus::AccessGranted)
        .count();
    log::info!("force sync user_id={} granted={}", user_id, new_access_granted);

    Ok(ForceSyncReport {
        diagnosis,
        sync_results,
        new_access_granted,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileCustomer {
    /// Owner of the payment. Falls back to the operator's own id when absent.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A payment the operator says was captured but whose webhook never arrived.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPaymentRecord {
    pub payment_id: String,
    /// Major units, e.g. `89.99`.
    pub amount: f64,
    pub product_id: i32,
    #[serde(default)]
    pub customer_details: ReconcileCustomer,
}

impl ExternalPaymentRecord {
    pub fn amount_minor(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    Reconciled,
    Duplicate,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    pub payment_id: String,
    pub user_id: String,
    pub product_id: i32,
    pub status: ReconcileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub total: usize,
    pub successful: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    fn from_results(results: &[ReconcileResult]) -> Self {
        let count = |s: ReconcileStatus| results.iter().filter(|r| r.status == s).count();
        let successful = count(ReconcileStatus::Reconciled);
        let duplicates = count(ReconcileStatus::Duplicate);
        Self {
            total: results.len(),
            successful,
            duplicates,
            failed: results.len() - successful - duplicates,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub summary: ReconcileSummary,
    pub results: Vec<ReconcileResult>,
}

/// Replays the webhook's record-then-grant sequence for each record. With a
/// provider client, every record must be captured at the stated amount on the
/// provider side; without one the records are taken on trust.
pub async fn bulk_reconcile(
    pool: &PgPool,
    provider: Option<&RazorpayClient>,
    operator_id: &str,
    records: &[ExternalPaymentRecord],
) -> ReconcileReport {
    if provider.is_none() {
        log::warn!(
            "bulk reconcile of {} records without provider verification",
            records.len()
        );
    }

    let mut results = Vec::with_capacity(records.len());
    for record in records {
        let user_id = record
            .customer_details
            .user_id
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| operator_id.to_string());
        let (status, detail) = reconcile_one(pool, provider, &user_id, record).await;
        results.push(ReconcileResult {
            payment_id: record.payment_id.clone(),
            user_id,
            product_id: record.product_id,
            status,
            detail,
        });
    }

    ReconcileReport {
        summary: ReconcileSummary::from_results(&results),
        results,
    }
}

async fn reconcile_one(
    pool: &PgPool,
    provider: Option<&RazorpayClient>,
    user_id: &str,
    record: &ExternalPaymentRecord,
) -> (ReconcileStatus, Option<String>) {
    let product = match db::get_product(pool, record.product_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return (ReconcileStatus::Error, Some("Product not found".to_string())),
        Err(e) => {
            log::error!("reconcile get_product error: {e}");
            return (ReconcileStatus::Error, Some(e.to_string()));
        }
    };

    let amount_minor = record.amount_minor();
    if record.payment_id.trim().is_empty() || !amount_is_storable(amount_minor) {
        return (ReconcileStatus::Error, Some("Invalid payment record".to_string()));
    }

    if let Some(client) = provider {
        match client.fetch_payment(&record.payment_id).await {
            Ok(remote) if remote.is_captured_for(amount_minor) => {}
            Ok(remote) => {
                return (
                    ReconcileStatus::Rejected,
                    Some(format!(
                        "provider reports status={} amount={}",
                        remote.status, remote.amount
                    )),
                )
            }
            Err(e) => {
                log::warn!("reconcile provider lookup failed id={}: {e}", record.payment_id);
                return (ReconcileStatus::Rejected, Some(e.to_string()));
            }
        }
    }

    let amount = minor_units_to_decimal(amount_minor);
    let notes = serde_json::json!({
        "manual_reconcile": true,
        "provider_verified": provider.is_some(),
        "customer_name": record.customer_details.name,
        "customer_email": record.customer_details.email,
        "product_name": product.name,
        "reconciled_at": chrono::Utc::now().to_rfc3339(),
    });
    let new_payment = NewPayment {
        payment_id: &record.payment_id,
        user_id,
        product_id: record.product_id,
        amount: &amount,
        status: PAYMENT_STATUS_COMPLETED,
        payment_method: PAYMENT_METHOD_WEBHOOK_VERIFIED,
        razorpay_link_used: product.razorpay_link.as_deref(),
        issue_notes: Some(notes.to_string()),
    };

    match library::record_payment_and_grant(pool, &new_payment).await {
        Ok(GrantOutcome::Granted { .. }) => {
            log::info!(
                "reconciled payment_id={} user_id={} product_id={}",
                record.payment_id,
                user_id,
                record.product_id
            );
            (ReconcileStatus::Reconciled, None)
        }
        Ok(GrantOutcome::Duplicate) => (ReconcileStatus::Duplicate, None),
        Err(e) => {
            log::error!("reconcile failed payment_id={}: {e}", record.payment_id);
            (ReconcileStatus::Error, Some(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn payment(product_id: i32, payment_id: &str) -> Payment {
        Payment {
            id: 1,
            payment_id: Some(payment_id.to_string()),
            user_id: "u1".into(),
            product_id,
            razorpay_link_used: None,
            amount: "99.00".into(),
            date_time: None,
            status: "completed".into(),
            payment_method: Some(PAYMENT_METHOD_WEBHOOK_VERIFIED.into()),
            issue_notes: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn entry(product_id: i32) -> LibraryEntry {
        LibraryEntry {
            id: product_id * 10,
            user_id: "u1".into(),
            product_id,
            access_granted: true,
            purchase_date: Utc::now(),
            created_at: None,
        }
    }

    #[test]
    fn missing_products_are_set_difference() {
        let payments = vec![payment(1, "a"), payment(2, "b"), payment(3, "c"), payment(2, "d")];
        let library = vec![entry(1)];
        assert_eq!(missing_library_products(&payments, &library), vec![2, 3]);
        assert!(missing_library_products(&[], &library).is_empty());
    }

    #[test]
    fn sync_result_classification() {
        let p = payment(4, "pay_x");

        let granted = SyncResult::classify(&p, Ok(entry(4)));
        assert_eq!(granted.status, SyncStatus::AccessGranted);
        assert_eq!(granted.library_id, Some(40));

        let exists = SyncResult::classify(&p, Err(LibraryError::AlreadyInLibrary));
        assert_eq!(exists.status, SyncStatus::AlreadyHasAccess);
        assert!(exists.error.is_none());

        let err = SyncResult::classify(&p, Err(LibraryError::NoCompletedPayment));
        assert_eq!(err.status, SyncStatus::Error);
        assert!(err.error.unwrap().contains("no completed payment"));
    }

    #[test]
    fn records_deserialize_from_camel_case() {
        let record: ExternalPaymentRecord = serde_json::from_value(serde_json::json!({
            "paymentId": "pay_missed",
            "amount": 89.99,
            "productId": 2,
            "customerDetails": { "userId": "u9", "email": "u9@example.com" }
        }))
        .unwrap();
        assert_eq!(record.customer_details.user_id.as_deref(), Some("u9"));
        assert_eq!(record.amount_minor(), 8999);

        let bare: ExternalPaymentRecord = serde_json::from_value(serde_json::json!({
            "paymentId": "pay_bare",
            "amount": 10,
            "productId": 1
        }))
        .unwrap();
        assert!(bare.customer_details.user_id.is_none());
        assert_eq!(bare.amount_minor(), 1000);
    }

    #[test]
    fn summary_counts_by_status() {
        let result = |status| ReconcileResult {
            payment_id: "p".into(),
            user_id: "u1".into(),
            product_id: 1,
            status,
            detail: None,
        };
        let results = vec![
            result(ReconcileStatus::Reconciled),
            result(ReconcileStatus::Reconciled),
            result(ReconcileStatus::Duplicate),
            result(ReconcileStatus::Rejected),
            result(ReconcileStatus::Error),
        ];
        assert_eq!(
            ReconcileSummary::from_results(&results),
            ReconcileSummary {
                total: 5,
                successful: 2,
                duplicates: 1,
                failed: 2,
            }
        );
    }
}
