use std::collections::HashMap;
use std::future::Future;

use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use postgres_derive::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Transaction;
use uuid::Uuid;
use validator::Validate;

use crate::common::{
    self, field_names_without_id, hash_map_from_validation_errors,
};
use crate::models::common::Role;
use crate::models::users::{User, UserId};
use crate::policy::{self, OrgAction};
use crate::postgres_common::core::{
    delete, entity, insert, select_all, select_one, update, QueryCondition,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql, Default,
)]
#[postgres(transparent)]
pub struct OrgId(pub Uuid);

/// The org id doubles as the stable public identifier that dashboard URLs
/// and join-by-id use; it never changes after creation.
entity! {
    #[derive(Debug, Clone)]
    pub struct Organization {
        id: OrgId,
        name: String,
        campus: Option<String>,
        created_by: Option<UserId>,
        created_at: NaiveDateTime,
        updated_at: NaiveDateTime,
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql, Default,
)]
#[postgres(transparent)]
pub struct MembershipId(pub Uuid);

entity! {
    #[derive(Debug, Clone)]
    pub struct Membership {
        id: MembershipId,
        user_id: UserId,
        org_id: OrgId,
        role: Role,
        is_active: bool,
        joined_at: NaiveDateTime,
    }
}

pub fn organization_table() -> String {
    "organizations".to_string()
}

pub fn membership_table() -> String {
    "memberships".to_string()
}

#[derive(Debug, Validate, Serialize, Deserialize, Clone)]
pub struct OrganizationDto {
    pub id: Uuid,
    #[validate(length(min = 1, message = "name_required"))]
    pub name: String,
    pub campus: Option<String>,
}

pub fn organization_from_dto(
    dto: OrganizationDto,
    founder: UserId,
    now: NaiveDateTime,
) -> Organization {
    Organization {
        id: OrgId(dto.id),
        name: dto.name,
        campus: dto.campus,
        created_by: Some(founder),
        created_at: now,
        updated_at: now,
    }
}

/// The founding owner's row, inserted in the same transaction as the org.
pub fn founder_membership(org: &Organization, founder: &User, now: NaiveDateTime) -> Membership {
    Membership {
        id: MembershipId(Uuid::new_v4()),
        user_id: founder.id,
        org_id: org.id,
        role: Role::Owner,
        is_active: true,
        joined_at: now,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateOrganizationError {
    #[error("Organization invalid")]
    OrganizationInvalid(HashMap<String, String>),

    #[error("Repo error: {0}")]
    RepoError(String),
}

pub async fn create_organization<FA, FB>(
    insert_org: impl FnOnce(Organization) -> FA,
    insert_membership: impl FnOnce(Membership) -> FB,
    dto: &OrganizationDto,
    founder: &User,
    now: NaiveDateTime,
) -> Result<(Organization, Membership), CreateOrganizationError>
where
    FA: Future<Output = Result<(), anyhow::Error>>,
    FB: Future<Output = Result<(), anyhow::Error>>,
{
    dto.validate().map_err(|e| {
        CreateOrganizationError::OrganizationInvalid(hash_map_from_validation_errors(e))
    })?;
    let org = organization_from_dto(dto.clone(), founder.id, now);
    insert_org(org.clone())
        .await
        .map_err(|e| CreateOrganizationError::RepoError(e.to_string()))?;
    let membership = founder_membership(&org, founder, now);
    insert_membership(membership.clone())
        .await
        .map_err(|e| CreateOrganizationError::RepoError(e.to_string()))?;
    Ok((org, membership))
}

#[derive(Debug, thiserror::Error)]
pub enum JoinOrganizationError {
    #[error("Organization not found")]
    NotFound,

    #[error("Repo error: {0}")]
    RepoError(String),
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub org: Organization,
    pub membership: Membership,
    pub newly_joined: bool,
}

/// Direct join by org id: get-or-create a Member-role membership. An
/// existing membership of any role is left untouched and reported as
/// `newly_joined = false`.
pub async fn join_by_org_id<FA, FB, FC>(
    find_org: impl FnOnce(OrgId) -> FA,
    find_membership: impl FnOnce(UserId, OrgId) -> FB,
    insert_membership: impl FnOnce(Membership) -> FC,
    org_id: OrgId,
    user: &User,
    now: NaiveDateTime,
) -> Result<JoinOutcome, JoinOrganizationError>
where
    FA: Future<Output = Result<Option<Organization>, anyhow::Error>>,
    FB: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FC: Future<Output = Result<(), anyhow::Error>>,
{
    let org = find_org(org_id)
        .await
        .map_err(|e| JoinOrganizationError::RepoError(e.to_string()))?
        .ok_or(JoinOrganizationError::NotFound)?;
    let user_id = user.id;
    let (membership, newly_joined) = common::get_or_create(
        || find_membership(user_id, org_id),
        insert_membership,
        || Membership {
            id: MembershipId(Uuid::new_v4()),
            user_id,
            org_id,
            role: Role::Member,
            is_active: true,
            joined_at: now,
        },
    )
    .await
    .map_err(|e: anyhow::Error| JoinOrganizationError::RepoError(e.to_string()))?;
    Ok(JoinOutcome {
        org,
        membership,
        newly_joined,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateRoleError {
    #[error("Only the owner can change roles")]
    Forbidden,

    #[error("Membership not found")]
    NotFound,

    #[error("Only one owner is allowed per organization")]
    OwnerConflict,

    #[error("Repo error: {0}")]
    RepoError(String),
}

/// Owner-only role overwrite. The one-owner rule is checked here and backed
/// by the partial unique index on memberships(org_id) where role = 'owner';
/// the whole call runs inside the caller's transaction.
pub async fn update_member_role<FA, FB, FC, FD>(
    find_acting_membership: impl FnOnce(UserId, OrgId) -> FA,
    find_target_membership: impl FnOnce(MembershipId) -> FB,
    find_other_owner: impl FnOnce(OrgId, MembershipId) -> FC,
    save_membership: impl FnOnce(Membership) -> FD,
    org_id: OrgId,
    acting: &User,
    target_id: MembershipId,
    new_role: Role,
) -> Result<Membership, UpdateRoleError>
where
    FA: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FB: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FC: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FD: Future<Output = Result<(), anyhow::Error>>,
{
    let acting_membership = find_acting_membership(acting.id, org_id)
        .await
        .map_err(|e| UpdateRoleError::RepoError(e.to_string()))?;
    if !policy::can_perform(acting_membership.as_ref(), OrgAction::ChangeRole) {
        return Err(UpdateRoleError::Forbidden);
    }
    // Role changes are owner-only, stricter than the policy gate.
    match acting_membership {
        Some(m) if m.role == Role::Owner => {}
        _ => return Err(UpdateRoleError::Forbidden),
    }

    let mut target = find_target_membership(target_id)
        .await
        .map_err(|e| UpdateRoleError::RepoError(e.to_string()))?
        .ok_or(UpdateRoleError::NotFound)?;
    if target.org_id != org_id {
        return Err(UpdateRoleError::NotFound);
    }

    if new_role == Role::Owner {
        let other_owner = find_other_owner(org_id, target.id)
            .await
            .map_err(|e| UpdateRoleError::RepoError(e.to_string()))?;
        if other_owner.is_some() {
            return Err(UpdateRoleError::OwnerConflict);
        }
    }

    target.role = new_role;
    save_membership(target.clone())
        .await
        .map_err(|e| UpdateRoleError::RepoError(e.to_string()))?;
    Ok(target)
}

#[derive(Debug, thiserror::Error)]
pub enum LeaveOrganizationError {
    #[error("You are not a member of this organization")]
    NotFound,

    #[error("Owner cannot leave the organization. Transfer ownership first.")]
    OwnerCannotLeave,

    #[error("Repo error: {0}")]
    RepoError(String),
}

pub async fn leave_organization<FA, FB>(
    find_membership: impl FnOnce(UserId, OrgId) -> FA,
    delete_membership: impl FnOnce(MembershipId) -> FB,
    org_id: OrgId,
    user: &User,
) -> Result<(), LeaveOrganizationError>
where
    FA: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FB: Future<Output = Result<(), anyhow::Error>>,
{
    let membership = find_membership(user.id, org_id)
        .await
        .map_err(|e| LeaveOrganizationError::RepoError(e.to_string()))?
        .ok_or(LeaveOrganizationError::NotFound)?;
    if membership.role == Role::Owner {
        return Err(LeaveOrganizationError::OwnerCannotLeave);
    }
    delete_membership(membership.id)
        .await
        .map_err(|e| LeaveOrganizationError::RepoError(e.to_string()))?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("You are not a member of this organization")]
    Forbidden,

    #[error("Repo error: {0}")]
    RepoError(String),
}

/// Dashboard entry: any active membership may view; returns the viewer's
/// own membership plus the full member list.
pub async fn dashboard_members<FA, FB>(
    find_acting_membership: impl FnOnce(UserId, OrgId) -> FA,
    list_memberships: impl FnOnce(OrgId) -> FB,
    org_id: OrgId,
    viewer: &User,
) -> Result<(Membership, Vec<Membership>), DashboardError>
where
    FA: Future<Output = Result<Option<Membership>, anyhow::Error>>,
    FB: Future<Output = Result<Vec<Membership>, anyhow::Error>>,
{
    let acting = find_acting_membership(viewer.id, org_id)
        .await
        .map_err(|e| DashboardError::RepoError(e.to_string()))?;
    if !policy::can_perform(acting.as_ref(), OrgAction::ViewDashboard) {
        return Err(DashboardError::Forbidden);
    }
    let acting = acting.ok_or(DashboardError::Forbidden)?;
    let members = list_memberships(org_id)
        .await
        .map_err(|e| DashboardError::RepoError(e.to_string()))?;
    Ok((acting, members))
}

pub fn insert_organization<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Organization) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |org: Organization| {
        Box::pin(async move {
            let fields = field_names_without_id(Organization::field_names());
            insert(
                tx,
                &organization_table(),
                "id",
                fields.as_slice(),
                &org.id,
                &org.to_params(),
            )
            .await
        })
    }
}

pub fn find_organization_by_id<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(OrgId) -> BoxFuture<'a, Result<Option<Organization>, anyhow::Error>> {
    move |org_id: OrgId| {
        Box::pin(async move {
            let crit = OrganizationCriteria::IdEq(org_id);
            let conds = vec![crit.to_query_condition()];
            select_one(tx, &organization_table(), &conds, Organization::from_row).await
        })
    }
}

pub fn insert_membership<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Membership) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |membership: Membership| {
        Box::pin(async move {
            let fields = field_names_without_id(Membership::field_names());
            insert(
                tx,
                &membership_table(),
                "id",
                fields.as_slice(),
                &membership.id,
                &membership.to_params(),
            )
            .await
        })
    }
}

pub fn find_membership_by_user_and_org<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(UserId, OrgId) -> BoxFuture<'a, Result<Option<Membership>, anyhow::Error>> {
    move |user_id: UserId, org_id: OrgId| {
        Box::pin(async move {
            let user_crit = MembershipCriteria::UserIdEq(user_id);
            let org_crit = MembershipCriteria::OrgIdEq(org_id);
            let conds = vec![user_crit.to_query_condition(), org_crit.to_query_condition()];
            select_one(tx, &membership_table(), &conds, Membership::from_row).await
        })
    }
}

pub fn find_membership_by_id<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(MembershipId) -> BoxFuture<'a, Result<Option<Membership>, anyhow::Error>> {
    move |id: MembershipId| {
        Box::pin(async move {
            let crit = MembershipCriteria::IdEq(id);
            let conds = vec![crit.to_query_condition()];
            select_one(tx, &membership_table(), &conds, Membership::from_row).await
        })
    }
}

/// Any owner row in the org other than the given membership. Used to
/// enforce the one-owner rule before promoting.
pub fn find_owner_excluding<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(OrgId, MembershipId) -> BoxFuture<'a, Result<Option<Membership>, anyhow::Error>>
{
    move |org_id: OrgId, excluding: MembershipId| {
        Box::pin(async move {
            let org_crit = MembershipCriteria::OrgIdEq(org_id);
            let role_crit = MembershipCriteria::RoleEq(Role::Owner);
            let id_crit = MembershipCriteria::IdNeq(excluding);
            let conds = vec![
                org_crit.to_query_condition(),
                role_crit.to_query_condition(),
                id_crit.to_query_condition(),
            ];
            select_one(tx, &membership_table(), &conds, Membership::from_row).await
        })
    }
}

pub fn update_membership<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(Membership) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |membership: Membership| {
        Box::pin(async move {
            let fields = field_names_without_id(Membership::field_names());
            update(
                tx,
                &membership_table(),
                "id",
                fields.as_slice(),
                &membership.id,
                &membership.to_params(),
            )
            .await
        })
    }
}

pub fn delete_membership<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(MembershipId) -> BoxFuture<'a, Result<(), anyhow::Error>> {
    move |id: MembershipId| {
        Box::pin(async move {
            let crit = MembershipCriteria::IdEq(id);
            let conds = vec![crit.to_query_condition()];
            delete(tx, &membership_table(), &conds).await?;
            Ok(())
        })
    }
}

/// Dashboard listing: every membership row of the org.
pub fn list_memberships_for_org<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(OrgId) -> BoxFuture<'a, Result<Vec<Membership>, anyhow::Error>> {
    move |org_id: OrgId| {
        Box::pin(async move {
            let crit = MembershipCriteria::OrgIdEq(org_id);
            let conds = vec![crit.to_query_condition()];
            select_all(tx, &membership_table(), &conds, Membership::from_row).await
        })
    }
}

/// The orgs a user can open a dashboard for (active memberships only).
pub fn list_active_memberships_for_user<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(UserId) -> BoxFuture<'a, Result<Vec<Membership>, anyhow::Error>> {
    move |user_id: UserId| {
        Box::pin(async move {
            let user_crit = MembershipCriteria::UserIdEq(user_id);
            let active_crit = MembershipCriteria::IsActiveEq(true);
            let conds = vec![
                user_crit.to_query_condition(),
                active_crit.to_query_condition(),
            ];
            select_all(tx, &membership_table(), &conds, Membership::from_row).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{NaiveDate, NaiveDateTime};
    use futures::{executor::block_on, future::BoxFuture};
    use uuid::Uuid;

    use super::{
        create_organization, join_by_org_id, leave_organization, update_member_role,
        CreateOrganizationError, JoinOrganizationError, LeaveOrganizationError, Membership,
        MembershipId, OrgId, Organization, OrganizationDto, UpdateRoleError,
    };
    use crate::models::common::Role;
    use crate::models::users::{User, UserId};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd(2024, 3, 1).and_hms(12, 0, 0)
    }

    fn user(email: &str) -> User {
        User {
            id: UserId(Uuid::new_v4()),
            username: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            verified: true,
            created_at: now(),
        }
    }

    fn org_dto() -> OrganizationDto {
        OrganizationDto {
            id: Uuid::from_str("3c3f5220-8b3d-40a3-8da2-196a69beaca8").unwrap(),
            name: "Alpha".to_string(),
            campus: None,
        }
    }

    fn org() -> Organization {
        Organization {
            id: OrgId(org_dto().id),
            name: "Alpha".to_string(),
            campus: None,
            created_by: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn membership(user: &User, org_id: OrgId, role: Role) -> Membership {
        Membership {
            id: MembershipId(Uuid::new_v4()),
            user_id: user.id,
            org_id,
            role,
            is_active: true,
            joined_at: now(),
        }
    }

    fn insert_ok<'a, T: Send + 'a>(
        count: &'a mut u8,
    ) -> impl FnOnce(T) -> BoxFuture<'a, Result<(), anyhow::Error>> {
        move |_| {
            *count += 1;
            Box::pin(async move { Ok(()) })
        }
    }

    #[test]
    fn test_create_organization_makes_founder_owner() {
        let founder = user("a@x.com");
        let mut org_count: u8 = 0;
        let mut membership_count: u8 = 0;
        let res = block_on(create_organization(
            insert_ok(&mut org_count),
            insert_ok(&mut membership_count),
            &org_dto(),
            &founder,
            now(),
        ));
        match res {
            Ok((org, membership)) => {
                assert_eq!("Alpha", org.name);
                assert_eq!(Some(founder.id), org.created_by);
                assert_eq!(Role::Owner, membership.role);
                assert_eq!(org.id, membership.org_id);
                assert!(membership.is_active);
                assert_eq!(1, org_count);
                assert_eq!(1, membership_count);
            }
            Err(_) => assert!(false, "organization creation failed"),
        }
    }

    #[test]
    fn test_create_organization_rejects_empty_name() {
        let founder = user("a@x.com");
        let dto = OrganizationDto {
            name: "".to_string(),
            ..org_dto()
        };
        let mut org_count: u8 = 0;
        let mut membership_count: u8 = 0;
        let res = block_on(create_organization(
            insert_ok(&mut org_count),
            insert_ok(&mut membership_count),
            &dto,
            &founder,
            now(),
        ));
        match res {
            Err(CreateOrganizationError::OrganizationInvalid(map)) => {
                assert!(map.contains_key("name"));
                assert_eq!(0, org_count);
                assert_eq!(0, membership_count);
            }
            _ => assert!(false, "expected OrganizationInvalid"),
        }
    }

    #[test]
    fn test_join_creates_member_when_absent() {
        let joiner = user("b@x.com");
        let the_org = org();
        let mut insert_count: u8 = 0;
        let res = block_on(join_by_org_id(
            move |_| async move { Ok(Some(the_org)) },
            |_, _| async { Ok(None) },
            insert_ok(&mut insert_count),
            OrgId(org_dto().id),
            &joiner,
            now(),
        ));
        match res {
            Ok(outcome) => {
                assert!(outcome.newly_joined);
                assert_eq!(Role::Member, outcome.membership.role);
                assert_eq!(joiner.id, outcome.membership.user_id);
                assert_eq!(1, insert_count);
            }
            Err(_) => assert!(false, "join failed"),
        }
    }

    #[test]
    fn test_join_is_noop_when_already_member() {
        let joiner = user("b@x.com");
        let the_org = org();
        let existing = membership(&joiner, the_org.id, Role::Admin);
        let mut insert_count: u8 = 0;
        let res = block_on(join_by_org_id(
            move |_| async move { Ok(Some(the_org)) },
            move |_, _| async move { Ok(Some(existing)) },
            insert_ok(&mut insert_count),
            OrgId(org_dto().id),
            &joiner,
            now(),
        ));
        match res {
            Ok(outcome) => {
                assert!(!outcome.newly_joined);
                // existing role kept, not reset to member
                assert_eq!(Role::Admin, outcome.membership.role);
                assert_eq!(0, insert_count);
            }
            Err(_) => assert!(false, "join failed"),
        }
    }

    #[test]
    fn test_join_fails_when_org_missing() {
        let joiner = user("b@x.com");
        let mut insert_count: u8 = 0;
        let res = block_on(join_by_org_id(
            |_| async { Ok(None) },
            |_, _| async { Ok(None) },
            insert_ok(&mut insert_count),
            OrgId(Uuid::new_v4()),
            &joiner,
            now(),
        ));
        match res {
            Err(JoinOrganizationError::NotFound) => assert_eq!(0, insert_count),
            _ => assert!(false, "expected NotFound"),
        }
    }

    #[test]
    fn test_update_role_forbidden_for_admin() {
        let acting = user("admin@x.com");
        let the_org = org();
        let acting_membership = membership(&acting, the_org.id, Role::Admin);
        let target = membership(&user("c@x.com"), the_org.id, Role::Member);
        let target_id = target.id;
        let mut save_count: u8 = 0;
        let res = block_on(update_member_role(
            move |_, _| async move { Ok(Some(acting_membership)) },
            move |_| async move { Ok(Some(target)) },
            |_, _| async { Ok(None) },
            insert_ok(&mut save_count),
            the_org.id,
            &acting,
            target_id,
            Role::Creator,
        ));
        match res {
            Err(UpdateRoleError::Forbidden) => assert_eq!(0, save_count),
            _ => assert!(false, "expected Forbidden"),
        }
    }

    #[test]
    fn test_update_role_owner_conflict() {
        let acting = user("owner@x.com");
        let the_org = org();
        let acting_membership = membership(&acting, the_org.id, Role::Owner);
        let existing_owner = acting_membership.clone();
        let target = membership(&user("c@x.com"), the_org.id, Role::Member);
        let target_id = target.id;
        let mut save_count: u8 = 0;
        let res = block_on(update_member_role(
            move |_, _| async move { Ok(Some(acting_membership)) },
            move |_| async move { Ok(Some(target)) },
            move |_, _| async move { Ok(Some(existing_owner)) },
            insert_ok(&mut save_count),
            the_org.id,
            &acting,
            target_id,
            Role::Owner,
        ));
        match res {
            Err(UpdateRoleError::OwnerConflict) => assert_eq!(0, save_count),
            _ => assert!(false, "expected OwnerConflict"),
        }
    }

    #[test]
    fn test_update_role_overwrites_in_place() {
        let acting = user("owner@x.com");
        let the_org = org();
        let acting_membership = membership(&acting, the_org.id, Role::Owner);
        let target = membership(&user("c@x.com"), the_org.id, Role::Member);
        let target_id = target.id;
        let mut save_count: u8 = 0;
        let res = block_on(update_member_role(
            move |_, _| async move { Ok(Some(acting_membership)) },
            move |_| async move { Ok(Some(target)) },
            |_, _| async { Ok(None) },
            insert_ok(&mut save_count),
            the_org.id,
            &acting,
            target_id,
            Role::Admin,
        ));
        match res {
            Ok(updated) => {
                assert_eq!(Role::Admin, updated.role);
                assert_eq!(target_id, updated.id);
                assert_eq!(1, save_count);
            }
            Err(_) => assert!(false, "role update failed"),
        }
    }

    #[test]
    fn test_update_role_target_in_other_org_is_not_found() {
        let acting = user("owner@x.com");
        let the_org = org();
        let acting_membership = membership(&acting, the_org.id, Role::Owner);
        let target = membership(&user("c@x.com"), OrgId(Uuid::new_v4()), Role::Member);
        let target_id = target.id;
        let mut save_count: u8 = 0;
        let res = block_on(update_member_role(
            move |_, _| async move { Ok(Some(acting_membership)) },
            move |_| async move { Ok(Some(target)) },
            |_, _| async { Ok(None) },
            insert_ok(&mut save_count),
            the_org.id,
            &acting,
            target_id,
            Role::Admin,
        ));
        match res {
            Err(UpdateRoleError::NotFound) => assert_eq!(0, save_count),
            _ => assert!(false, "expected NotFound"),
        }
    }

    #[test]
    fn test_dashboard_forbidden_for_non_member() {
        let stranger = user("s@x.com");
        let res = block_on(super::dashboard_members(
            |_, _| async { Ok(None) },
            |_| async {
                assert!(false, "listing must not run for non-members");
                Ok(vec![])
            },
            org().id,
            &stranger,
        ));
        assert!(matches!(res, Err(super::DashboardError::Forbidden)));
    }

    #[test]
    fn test_dashboard_lists_members_for_member() {
        let viewer = user("m@x.com");
        let the_org = org();
        let viewer_membership = membership(&viewer, the_org.id, Role::Member);
        let all = vec![
            membership(&user("owner@x.com"), the_org.id, Role::Owner),
            viewer_membership.clone(),
        ];
        let res = block_on(super::dashboard_members(
            move |_, _| async move { Ok(Some(viewer_membership)) },
            move |_| async move { Ok(all) },
            the_org.id,
            &viewer,
        ));
        match res {
            Ok((acting, members)) => {
                assert_eq!(viewer.id, acting.user_id);
                assert_eq!(2, members.len());
            }
            Err(_) => assert!(false, "dashboard failed"),
        }
    }

    #[test]
    fn test_owner_cannot_leave() {
        let owner = user("owner@x.com");
        let the_org = org();
        let owner_membership = membership(&owner, the_org.id, Role::Owner);
        let mut delete_count: u8 = 0;
        let res = block_on(leave_organization(
            move |_, _| async move { Ok(Some(owner_membership)) },
            insert_ok(&mut delete_count),
            the_org.id,
            &owner,
        ));
        match res {
            Err(LeaveOrganizationError::OwnerCannotLeave) => assert_eq!(0, delete_count),
            _ => assert!(false, "expected OwnerCannotLeave"),
        }
    }

    #[test]
    fn test_member_leave_deletes_row() {
        let member = user("m@x.com");
        let the_org = org();
        let m = membership(&member, the_org.id, Role::Member);
        let mut delete_count: u8 = 0;
        let res = block_on(leave_organization(
            move |_, _| async move { Ok(Some(m)) },
            insert_ok(&mut delete_count),
            the_org.id,
            &member,
        ));
        assert!(res.is_ok());
        assert_eq!(1, delete_count);
    }

    #[test]
    fn test_leave_when_not_member_is_not_found() {
        let stranger = user("s@x.com");
        let mut delete_count: u8 = 0;
        let res = block_on(leave_organization(
            |_, _| async { Ok(None) },
            insert_ok(&mut delete_count),
            org().id,
            &stranger,
        ));
        match res {
            Err(LeaveOrganizationError::NotFound) => assert_eq!(0, delete_count),
            _ => assert!(false, "expected NotFound"),
        }
    }
}
