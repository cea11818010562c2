use std::fmt;

use postgres_derive::{FromSql, ToSql};
use serde::{Deserialize, Serialize};

/// Membership / invite role. Maps onto the `org_role` Postgres enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "org_role")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[postgres(name = "owner")]
    Owner,
    #[postgres(name = "admin")]
    Admin,
    #[postgres(name = "creator")]
    Creator,
    #[postgres(name = "member")]
    Member,
}

impl Role {
    /// Human label used in email copy and member listings.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Admin => "Admin",
            Role::Creator => "Creator",
            Role::Member => "Member",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Member
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "creator" => Ok(Role::Creator),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Role;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::Owner, Role::Admin, Role::Creator, Role::Member] {
            let s = role.label().to_lowercase();
            assert_eq!(Ok(role), Role::from_str(&s));
        }
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(Role::from_str("superuser").is_err());
    }
}
