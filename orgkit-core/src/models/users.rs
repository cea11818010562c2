use std::collections::HashMap;

use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use postgres_derive::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Transaction;
use uuid::Uuid;
use validator::Validate;

use crate::common::{self, field_names_without_id, hash_map_from_validation_errors};
use crate::postgres_common::core::{entity, insert, select_one, QueryCondition};

/// Users are owned by the external identity provider; this table is the
/// projection the membership core joins against. No credentials here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql, Default,
)]
#[postgres(transparent)]
pub struct UserId(pub Uuid);

entity! {
    #[derive(Debug, Clone)]
    pub struct User {
        id: UserId,
        username: String,
        email: String,
        verified: bool,
        created_at: NaiveDateTime,
    }
}

pub const USER_TABLE: &str = "users";

pub fn user_table() -> String {
    USER_TABLE.to_string()
}

#[derive(Debug, Validate, Deserialize, Clone)]
pub struct UserDto {
    pub id: Uuid,
    #[validate(length(min = 3, message = "username_too_short"))]
    pub username: String,
    #[validate(email(message = "email_invalid"))]
    pub email: String,
}

pub fn user_from_dto(dto: UserDto, now: NaiveDateTime) -> User {
    User {
        id: UserId(dto.id),
        username: dto.username,
        email: dto.email,
        verified: false,
        created_at: now,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterUserError {
    #[error("User invalid")]
    UserInvalid(HashMap<String, String>),

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Repo error: {0}")]
    RepoError(String),
}

/// Registration as seen by this core: the identity provider has already
/// authenticated the signup; we record the projection row. Callers are
/// expected to run `invites::resolve_pending_invites` afterwards, exactly
/// as they do after login.
pub async fn register_user<FA, FB>(
    find_by_email: impl FnOnce(String) -> FA,
    insert_user: impl FnOnce(User) -> FB,
    dto: &UserDto,
    now: NaiveDateTime,
) -> Result<User, RegisterUserError>
where
    FA: std::future::Future<Output = Result<Option<User>, RegisterUserError>>,
    FB: std::future::Future<Output = Result<(), RegisterUserError>>,
{
    common::create(
        |d: &UserDto| {
            d.validate().map_err(|e| {
                RegisterUserError::UserInvalid(hash_map_from_validation_errors(e))
            })
        },
        |u: User| find_by_email(u.email),
        insert_user,
        |d: &UserDto| user_from_dto(d.clone(), now),
        dto,
        RegisterUserError::EmailTaken,
    )
    .await
}

pub fn find_user_by_email<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(String) -> BoxFuture<'a, Result<Option<User>, RegisterUserError>> {
    move |email: String| {
        Box::pin(async move {
            let crit = UserCriteria::EmailEq(email);
            let conds = vec![crit.to_query_condition()];
            select_one(tx, &user_table(), &conds, User::from_row)
                .await
                .map_err(|e| RegisterUserError::RepoError(e.to_string()))
        })
    }
}

pub fn insert_user<'a>(
    tx: &'a Transaction<'a>,
) -> impl FnOnce(User) -> BoxFuture<'a, Result<(), RegisterUserError>> {
    move |user: User| {
        Box::pin(async move {
            let fields = field_names_without_id(User::field_names());
            insert(
                tx,
                &user_table(),
                "id",
                fields.as_slice(),
                &user.id,
                &user.to_params(),
            )
            .await
            .map_err(|e| RegisterUserError::RepoError(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;
    use futures::{executor::block_on, future::BoxFuture};
    use uuid::Uuid;

    use super::{register_user, RegisterUserError, User, UserDto};

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd(2024, 3, 1).and_hms(12, 0, 0)
    }

    fn user_dto() -> UserDto {
        UserDto {
            id: Uuid::from_str("9acd36f9-b9f4-4fd1-840c-c161a9fd3c41").unwrap(),
            username: "someusername".to_string(),
            email: "someone@example.com".to_string(),
        }
    }

    fn find_by_email_none<'a>(
        count: &'a mut u8,
    ) -> impl FnOnce(String) -> BoxFuture<'a, Result<Option<User>, RegisterUserError>> {
        move |_| {
            *count += 1;
            Box::pin(async move { Ok(None) })
        }
    }

    fn insert_user_mock<'a>(
        count: &'a mut u8,
    ) -> impl FnOnce(User) -> BoxFuture<'a, Result<(), RegisterUserError>> {
        move |_| {
            *count += 1;
            Box::pin(async move { Ok(()) })
        }
    }

    #[test]
    fn test_register_ok() {
        let mut find_count: u8 = 0;
        let mut insert_count: u8 = 0;
        let res = block_on(register_user(
            find_by_email_none(&mut find_count),
            insert_user_mock(&mut insert_count),
            &user_dto(),
            now(),
        ));
        match res {
            Ok(user) => {
                assert_eq!("someone@example.com", user.email);
                assert!(!user.verified);
                assert_eq!(1, find_count);
                assert_eq!(1, insert_count);
            }
            Err(_) => assert!(false, "registration failed"),
        }
    }

    #[test]
    fn test_register_fails_with_invalid_email() {
        let dto = UserDto {
            email: "not-an-email".to_string(),
            ..user_dto()
        };
        let mut find_count: u8 = 0;
        let mut insert_count: u8 = 0;
        let res = block_on(register_user(
            find_by_email_none(&mut find_count),
            insert_user_mock(&mut insert_count),
            &dto,
            now(),
        ));
        match res {
            Err(RegisterUserError::UserInvalid(map)) => {
                assert!(map.contains_key("email"));
                assert_eq!(0, find_count);
                assert_eq!(0, insert_count);
            }
            _ => assert!(false, "expected UserInvalid"),
        }
    }

    #[test]
    fn test_register_fails_when_email_taken() {
        let mut insert_count: u8 = 0;
        let existing = super::user_from_dto(user_dto(), now());
        let res = block_on(register_user(
            move |_| async move { Ok(Some(existing)) },
            insert_user_mock(&mut insert_count),
            &user_dto(),
            now(),
        ));
        match res {
            Err(RegisterUserError::EmailTaken) => assert_eq!(0, insert_count),
            _ => assert!(false, "expected EmailTaken"),
        }
    }
}
