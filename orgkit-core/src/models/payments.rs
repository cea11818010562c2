use std::future::Future;

use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use postgres_derive::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Transaction;
use uuid::Uuid;

use crate::common::field_names_without_id;
use crate::gateway::GatewayError;
use crate::models::users::UserId;
use crate::postgres_common::core::{entity, insert, select_one, update, QueryCondition};

/// Flat invite fee, in minor currency units (paise).
pub const INVITE_FEE_MINOR_UNITS: i64 = 50_000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql, Default,
)]
#[postgres(transparent)]
pub struct PaymentId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "payment_status")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[postgres(name = "created")]
    Created,
    #[postgres(name = "paid")]
    Paid,
    #[postgres(name = "failed")]
    Failed,
}

impl PaymentStatus {
    /// Paid and Failed are write-once; a terminal payment is never
    /// transitioned again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }
}

entity! {
    #[derive(Debug, Clone)]
    pub struct Payment {
        id: PaymentId,
        user_id: Option<UserId>,
        order_id: String,
        gateway_payment_id: Option<String>,
        signature: Option<String>,
        amount: i64,
        status: PaymentStatus,
        failure_reason: Option<String>,
        created_at: NaiveDateTime,
    }
}

pub fn payment_table() -> String {
    "payments".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum CreatePaymentError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Repo error: {0}")]
    RepoError(String),
}

/// Opens a gateway order for the invite fee and records the Payment row in
/// status Created. The gateway call is the only network hop; the row insert
/// runs in the caller's transaction.
pub async fn create_invite_payment<FA, FB>(
    create_order: impl FnOnce(i64) -> FA,
    insert_payment: impl FnOnce(Payment) -> FB,
    user_id: Option<UserId>,
    now: NaiveDateTime,
) -> Result<Payment, CreatePaymentError>
where
    FA: Future<Output = Result<String, GatewayError>>,
    FB: Future<Output = Result<(), anyhow::Error>>,
{
    let order_id = create_order(INVITE_FEE_MINOR_UNITS).await?;
    let payment = Payment {
        id: PaymentId(Uuid::new_v4()),
        user_id,
        order_id,
        gateway_payment_id: None,
        signature: None,
        amount: INVITE_FEE_MINOR_UNITS,
        status: PaymentStatus::Created,
        failure_reason: None,
        created_at: now,
    };
    insert_payment(payment.clone())
        .await
        .map_err(|e| CreatePaymentError::RepoError(e.to_string()))?;
    Ok(payment)
}

#[derive(Debug, thiserror::Error)]
pub enum FinalizePaymentError {
    #[error("Webhook caller not authenticated")]
    Forbidden,

    #[error("Order not found")]
    NotFound,

    #[error("Payment signature verification failed")]
    SignatureInvalid,

    #[error(transparent)]
    Gateway(GatewayError),

    #[error("Repo error: {0}")]
    RepoError(String),
}

/// Webhook finalization: `{order_id, gateway_payment_id, signature}` plus a
/// shared secret identifying the caller. Idempotent: a payment already in a
/// terminal state is returned as-is. Verification failure records Failed
/// before surfacing `SignatureInvalid`; a gateway transport error mutates
/// nothing so the webhook can be retried.
pub async fn finalize_payment<FA, FB, FC>(
    find_by_order_id: impl FnOnce(String) -> FA,
    verify_signature: impl FnOnce(String, String, String) -> FB,
    save_payment: impl FnOnce(Payment) -> FC,
    order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
    provided_secret: &str,
    webhook_secret: &str,
) -> Result<PaymentStatus, FinalizePaymentError>
where
    FA: Future<Output = Result<Option<Payment>, anyhow::Error>>,
    FB: Future<Output = Result<bool, GatewayError>>,
    FC: Future<Output = Result<(), anyhow::Error>>,
{
    if provided_secret != webhook_secret {
        return Err(FinalizePaymentError::Forbidden);
    }
    let mut payment = find_by_order_id(order_id.to_string())
        .await
        .map_err(|e| FinalizePaymentError::RepoError(e.to_string()))?
        .ok_or(FinalizePaymentError::NotFound)?;
    if payment.status.is_terminal() {
        tracing::info!(order_id, status = ?payment.status, "payment already finalized, ignoring redelivery");
        return Ok(payment.status);
    }
    let verified = verify_signature(
        order_id.to_string(),
        gateway_payment_id.to_string(),
        signature.to_string(),
    )
    .await
    .map_err(FinalizePaymentError::Gateway)?;
    if verified {
        payment.gateway_payment_id = Some(gateway_payment_id.to_string());
        payment.signature = Some(signature.to_string());
        payment.status = PaymentStatus::Paid;
        save_payment(payment)
            .await
            .map_err(|e| FinalizePaymentError::RepoError(e.to_string()))?;
        Ok(PaymentStatus::Paid)
    } else {
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some("signature verification failed".to_string());
        save_payment(payment)
            .await
            .map_err(|e| FinalizePaymentError::RepoError(e.to_string()))?;
        Err(FinalizePaymentError::SignatureInvalid)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateStatusError {
    #[error("Webhook caller not authenticated")]
    Forbidden,

    #[error("Order not found")]
    NotFound,

    #[error("Repo error: {0}")]
    RepoError(String),
}

/// Out-of-band status correction. Only Created payments move; redelivering
/// an already-applied status is a no-op, and a conflicting correction on a
/// terminal payment is logged and ignored rather than double-applied.
pub async fn update_payment_status<FA, FB>(
    find_by_order_id: impl FnOnce(String) -> FA,
    save_payment: impl FnOnce(Payment) -> FB,
    order_id: &str,
    new_status: PaymentStatus,
    reason: Option<String>,
    provided_secret: &str,
    webhook_secret: &str,
) -> Result<PaymentStatus, UpdateStatusError>
where
    FA: Future<Output = Result<Option<Payment>, anyhow::Error>>,
    FB: Future<Output = Result<(), anyhow::Error>>,
{
    if provided_secret != webhook_secret {
        return Err(UpdateStatusError::Forbidden);
    }
    let mut payment = find_by_order_id(order_id.to_string())
        .await
        .map_err(|e| UpdateStatusError::RepoError(e.to_string()))?
        .ok_or(UpdateStatusError::NotFound)?;
    if payment.status == new_status {
        return Ok(payment.status);
    }
    if payment.status.is_terminal() {
        tracing::warn!(
            order_id,
            current = ?payment.status,
            requested = ?new_status,
            "ignoring status correction on terminal payment"
        );
        return Ok(payment.status);
    }
    payment.status = new_status;
    if reason.is_some() {
        payment.failure_reason = reason;
    }
    save_payment(payment)
        .await
        .map_err(|e| UpdateStatusError::RepoError(e.to_string()))?;
    Ok(new_status)
}

pub fn insert_payment<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Payment) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |payment: Payment| {
        Box::pin(async move {
            let fields = field_names_without_id(Payment::field_names());
            insert(
                tx,
                &payment_table(),
                "id",
                fields.as_slice(),
                &payment.id,
                &payment.to_params(),
            )
            .await
        })
    }
}

pub fn update_payment<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Payment) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |payment: Payment| {
        Box::pin(async move {
            let fields = field_names_without_id(Payment::field_names());
            update(
                tx,
                &payment_table(),
                "id",
                fields.as_slice(),
                &payment.id,
                &payment.to_params(),
            )
            .await
        })
    }
}

pub fn find_payment_by_id<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(PaymentId) -> BoxFuture<'a, Result<Option<Payment>, anyhow::Error>> {
    move |id: PaymentId| {
        Box::pin(async move {
            let crit = PaymentCriteria::IdEq(id);
            let conds = vec![crit.to_query_condition()];
            select_one(tx, &payment_table(), &conds, Payment::from_row).await
        })
    }
}

pub fn find_payment_by_order_id<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(String) -> BoxFuture<'a, Result<Option<Payment>, anyhow::Error>> {
    move |order_id: String| {
        Box::pin(async move {
            let crit = PaymentCriteria::OrderIdEq(order_id);
            let conds = vec![crit.to_query_condition()];
            select_one(tx, &payment_table(), &conds, Payment::from_row).await
        })
    }
}
