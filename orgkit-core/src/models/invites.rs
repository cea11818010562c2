use std::collections::HashMap;
use std::future::Future;

use chrono::{Duration, NaiveDateTime};
use futures::future::BoxFuture;
use postgres_derive::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Transaction;
use uuid::Uuid;
use validator::Validate;

use crate::common::{self, field_names_without_id, hash_map_from_validation_errors};
use crate::models::common::Role;
use crate::models::organizations::{Membership, MembershipId, OrgId, Organization};
use crate::models::payments::{CreatePaymentError, Payment, PaymentId, PaymentStatus};
use crate::models::users::{User, UserId};
use crate::notify::{render_invite_email, DeliveryError, InviteEmail};
use crate::policy::{self, OrgAction};
use crate::postgres_common::core::{entity, insert, select_all, select_one, update, QueryCondition};

pub const INVITE_TTL_DAYS: i64 = 7;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql, Default,
)]
#[postgres(transparent)]
pub struct InviteId(pub Uuid);

/// A token-addressable offer to join an org at a role. The token is the
/// public handle (a bearer credential); rows are never deleted — expired
/// and accepted invites stay behind as audit records. Acceptance is gated
/// on a Paid linked payment for every role.
entity! {
    #[derive(Debug, Clone)]
    pub struct Invite {
        id: InviteId,
        token: Uuid,
        org_id: OrgId,
        email: String,
        role: Role,
        invited_by: Option<UserId>,
        payment_id: Option<PaymentId>,
        accepted: bool,
        created_at: NaiveDateTime,
        expires_at: NaiveDateTime,
    }
}

impl Invite {
    /// Still acceptable: not yet accepted and not past expiry. Expiry is
    /// evaluated lazily here; there is no background sweep.
    pub fn is_valid(&self, now: NaiveDateTime) -> bool {
        !self.accepted && now < self.expires_at
    }
}

pub fn invite_table() -> String {
    "invites".to_string()
}

#[derive(Debug, Validate, Serialize, Deserialize, Clone)]
pub struct InviteDto {
    #[validate(email(message = "email_invalid"))]
    pub email: String,
    pub role: Role,
}

pub fn invite_from_dto(
    dto: InviteDto,
    org: &Organization,
    inviter: &User,
    now: NaiveDateTime,
) -> Invite {
    Invite {
        id: InviteId(Uuid::new_v4()),
        token: Uuid::new_v4(),
        org_id: org.id,
        email: dto.email,
        role: dto.role,
        invited_by: Some(inviter.id),
        payment_id: None,
        accepted: false,
        created_at: now,
        expires_at: now + Duration::days(INVITE_TTL_DAYS),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateInviteError {
    #[error("Invite invalid")]
    Invalid(HashMap<String, String>),

    #[error("Only owners or admins can invite users")]
    Forbidden,

    #[error("Repo error: {0}")]
    RepoError(String),
}

/// Creates the invite, opens the fee payment, and dispatches the email —
/// in that order. The invite row is the anchor: payment-order and email
/// failures are logged and swallowed so the record survives for an
/// out-of-band resend (deliberate retry-by-resend policy).
pub async fn create_invite<FA, FB, FC, FD, FE>(
    find_acting_membership: impl FnOnce(UserId, OrgId) -> FA,
    insert_invite: impl FnOnce(Invite) -> FB,
    create_payment: impl FnOnce(Invite) -> FC,
    save_invite: impl FnOnce(Invite) -> FD,
    send_email: impl FnOnce(InviteEmail) -> FE,
    dto: &InviteDto,
    org: &Organization,
    inviter: &User,
    base_url: &str,
    now: NaiveDateTime,
) -> Result<Invite, CreateInviteError>
where
    FA: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FB: Future<Output = Result<(), anyhow::Error>>,
    FC: Future<Output = Result<Payment, CreatePaymentError>>,
    FD: Future<Output = Result<(), anyhow::Error>>,
    FE: Future<Output = Result<(), DeliveryError>>,
{
    dto.validate()
        .map_err(|e| CreateInviteError::Invalid(hash_map_from_validation_errors(e)))?;
    let acting = find_acting_membership(inviter.id, org.id)
        .await
        .map_err(|e| CreateInviteError::RepoError(e.to_string()))?;
    if !policy::can_perform(acting.as_ref(), OrgAction::InviteUser) {
        return Err(CreateInviteError::Forbidden);
    }

    let invite = invite_from_dto(dto.clone(), org, inviter, now);
    insert_invite(invite.clone())
        .await
        .map_err(|e| CreateInviteError::RepoError(e.to_string()))?;

    let invite = match create_payment(invite.clone()).await {
        Ok(payment) => attach_payment(save_invite, invite, &payment)
            .await
            .map_err(|e| CreateInviteError::RepoError(e.to_string()))?,
        Err(e) => {
            tracing::warn!(
                token = %invite.token,
                error = %e,
                "payment order creation failed, invite kept for resend"
            );
            invite
        }
    };

    let email = render_invite_email(&invite.email, &org.name, invite.role, invite.token, base_url);
    if let Err(e) = send_email(email).await {
        tracing::warn!(token = %invite.token, error = %e, "invite email delivery failed");
    }
    Ok(invite)
}

/// Links a payment to the invite. Idempotent: relinking the same payment is
/// a no-op, and an invite that already carries a different payment keeps it
/// (one payment per invite).
pub async fn attach_payment<F>(
    save_invite: impl FnOnce(Invite) -> F,
    mut invite: Invite,
    payment: &Payment,
) -> Result<Invite, anyhow::Error>
where
    F: Future<Output = Result<(), anyhow::Error>>,
{
    match invite.payment_id {
        Some(existing) if existing == payment.id => Ok(invite),
        Some(_) => {
            tracing::warn!(token = %invite.token, "invite already linked to a payment, keeping existing link");
            Ok(invite)
        }
        None => {
            invite.payment_id = Some(payment.id);
            save_invite(invite.clone()).await?;
            Ok(invite)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcceptInviteError {
    #[error("Invite not found")]
    NotFound,

    #[error("Invite is expired or already used")]
    InviteInvalid,

    #[error("Payment of INR 500 is required to accept this invite")]
    PaymentRequired,

    #[error("Repo error: {0}")]
    RepoError(String),
}

#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub invite: Invite,
    pub membership: Membership,
    pub newly_joined: bool,
}

/// The accept transition. Preconditions: invite valid (not accepted, not
/// expired) and its linked payment Paid — unconditionally, for every role.
/// Membership creation is get-or-create keyed on (user, org): an existing
/// membership keeps its role and the call still succeeds, which is what
/// makes concurrent double-accept harmless. Runs inside the caller's
/// transaction; the memberships uniqueness constraint is the backstop.
pub async fn accept_invite<FA, FB, FC, FD>(
    find_payment: impl FnOnce(PaymentId) -> FA,
    find_membership: impl FnOnce(UserId, OrgId) -> FB,
    insert_membership: impl FnOnce(Membership) -> FC,
    save_invite: impl FnOnce(Invite) -> FD,
    invite: Invite,
    user: &User,
    now: NaiveDateTime,
) -> Result<AcceptOutcome, AcceptInviteError>
where
    FA: Future<Output = Result<Option<Payment>, anyhow::Error>>,
    FB: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FC: Future<Output = Result<(), anyhow::Error>>,
    FD: Future<Output = Result<(), anyhow::Error>>,
{
    if !invite.is_valid(now) {
        return Err(AcceptInviteError::InviteInvalid);
    }
    let payment_id = invite.payment_id.ok_or(AcceptInviteError::PaymentRequired)?;
    let payment = find_payment(payment_id)
        .await
        .map_err(|e| AcceptInviteError::RepoError(e.to_string()))?
        .ok_or(AcceptInviteError::PaymentRequired)?;
    if payment.status != PaymentStatus::Paid {
        return Err(AcceptInviteError::PaymentRequired);
    }

    let user_id = user.id;
    let org_id = invite.org_id;
    let role = invite.role;
    let (membership, newly_joined) = common::get_or_create(
        || find_membership(user_id, org_id),
        insert_membership,
        || Membership {
            id: MembershipId(Uuid::new_v4()),
            user_id,
            org_id,
            role,
            is_active: true,
            joined_at: now,
        },
    )
    .await
    .map_err(|e: anyhow::Error| AcceptInviteError::RepoError(e.to_string()))?;

    let mut invite = invite;
    invite.accepted = true;
    save_invite(invite.clone())
        .await
        .map_err(|e| AcceptInviteError::RepoError(e.to_string()))?;
    Ok(AcceptOutcome {
        invite,
        membership,
        newly_joined,
    })
}

/// Token-addressed accept, the shape the accept link resolves to.
pub async fn accept_by_token<FT, FA, FB, FC, FD>(
    find_invite: impl FnOnce(Uuid) -> FT,
    find_payment: impl FnOnce(PaymentId) -> FA,
    find_membership: impl FnOnce(UserId, OrgId) -> FB,
    insert_membership: impl FnOnce(Membership) -> FC,
    save_invite: impl FnOnce(Invite) -> FD,
    token: Uuid,
    user: &User,
    now: NaiveDateTime,
) -> Result<AcceptOutcome, AcceptInviteError>
where
    FT: Future<Output = Result<Option<Invite>, anyhow::Error>>,
    FA: Future<Output = Result<Option<Payment>, anyhow::Error>>,
    FB: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FC: Future<Output = Result<(), anyhow::Error>>,
    FD: Future<Output = Result<(), anyhow::Error>>,
{
    let invite = find_invite(token)
        .await
        .map_err(|e| AcceptInviteError::RepoError(e.to_string()))?
        .ok_or(AcceptInviteError::NotFound)?;
    accept_invite(
        find_payment,
        find_membership,
        insert_membership,
        save_invite,
        invite,
        user,
        now,
    )
    .await
}

/// The auto-join sweep, run after every successful signup or login:
/// best-effort, at-least-once. Accept failures (usually PaymentRequired)
/// are logged and swallowed so authentication itself never fails on a
/// stuck invite. Pending invites are not pruned when one of several for
/// the same (org, email) gets accepted.
pub async fn resolve_pending_invites<F, FF>(
    find_pending: impl FnOnce(String, NaiveDateTime) -> F,
    mut accept_one: impl FnMut(Invite) -> FF,
    user: &User,
    now: NaiveDateTime,
) -> Result<Vec<AcceptOutcome>, anyhow::Error>
where
    F: Future<Output = Result<Vec<Invite>, anyhow::Error>>,
    FF: Future<Output = Result<AcceptOutcome, AcceptInviteError>>,
{
    let invites = find_pending(user.email.clone(), now).await?;
    let mut outcomes = vec![];
    for invite in invites {
        let token = invite.token;
        match accept_one(invite).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "invite auto-accept failed");
            }
        }
    }
    Ok(outcomes)
}

pub fn insert_invite<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Invite) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |invite: Invite| {
        Box::pin(async move {
            let fields = field_names_without_id(Invite::field_names());
            insert(
                tx,
                &invite_table(),
                "id",
                fields.as_slice(),
                &invite.id,
                &invite.to_params(),
            )
            .await
        })
    }
}

pub fn update_invite<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Invite) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |invite: Invite| {
        Box::pin(async move {
            let fields = field_names_without_id(Invite::field_names());
            update(
                tx,
                &invite_table(),
                "id",
                fields.as_slice(),
                &invite.id,
                &invite.to_params(),
            )
            .await
        })
    }
}

pub fn find_invite_by_token<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Uuid) -> BoxFuture<'a, Result<Option<Invite>, anyhow::Error>> {
    move |token: Uuid| {
        Box::pin(async move {
            let crit = InviteCriteria::TokenEq(token);
            let conds = vec![crit.to_query_condition()];
            select_one(tx, &invite_table(), &conds, Invite::from_row).await
        })
    }
}

/// Unaccepted, unexpired invites addressed to the email.
pub fn find_pending_invites_by_email<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(String, NaiveDateTime) -> BoxFuture<'a, Result<Vec<Invite>, anyhow::Error>> {
    move |email: String, now: NaiveDateTime| {
        Box::pin(async move {
            let email_crit = InviteCriteria::EmailEq(email);
            let accepted_crit = InviteCriteria::AcceptedEq(false);
            let expiry_crit = InviteCriteria::ExpiresAtGt(now);
            let conds = vec![
                email_crit.to_query_condition(),
                accepted_crit.to_query_condition(),
                expiry_crit.to_query_condition(),
            ];
            select_all(tx, &invite_table(), &conds, Invite::from_row).await
        })
    }
}

/// Dashboard listing: all invites ever sent for the org, accepted and
/// expired ones included.
pub fn list_invites_for_org<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(OrgId) -> BoxFuture<'a, Result<Vec<Invite>, anyhow::Error>> {
    move |org_id: OrgId| {
        Box::pin(async move {
            let crit = InviteCriteria::OrgIdEq(org_id);
            let conds = vec![crit.to_query_condition()];
            select_all(tx, &invite_table(), &conds, Invite::from_row).await
        })
    }
}
