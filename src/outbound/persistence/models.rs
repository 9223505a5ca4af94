//! Internal Diesel row structs for database operations.
//!
//! Implementation details of the persistence layer; never exposed to the
//! domain. The service implementations convert between these rows and the
//! domain entities, keeping Diesel types confined to this adapter.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::domain::{Auth, Dial, DialMembership, User};

use super::schema::{auths, dial_memberships, dial_values, dials, users};

/// Row struct for reading from the users table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            api_key: row.api_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
            auths: Vec::new(),
        }
    }
}

/// Insertable struct for creating users.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub(crate) struct NewUserRow<'a> {
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub api_key: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row struct for reading from the auths table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = auths)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AuthRow {
    pub id: i32,
    pub user_id: i32,
    pub source: String,
    pub source_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AuthRow> for Auth {
    fn from(row: AuthRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            user: None,
            source: row.source,
            source_id: row.source_id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expiry: row.expiry,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insertable struct for creating auths.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = auths)]
pub(crate) struct NewAuthRow<'a> {
    pub user_id: i32,
    pub source: &'a str,
    pub source_id: &'a str,
    pub access_token: &'a str,
    pub refresh_token: &'a str,
    pub expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row struct for reading from the dials table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = dials)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DialRow {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub invite_code: String,
    pub value: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DialRow> for Dial {
    fn from(row: DialRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            user: None,
            name: row.name,
            invite_code: row.invite_code,
            value: row.value,
            created_at: row.created_at,
            updated_at: row.updated_at,
            memberships: Vec::new(),
        }
    }
}

/// Insertable struct for creating dials.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dials)]
pub(crate) struct NewDialRow<'a> {
    pub user_id: i32,
    pub name: &'a str,
    pub invite_code: &'a str,
    pub value: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row struct for the dial value history; doubles as the insertable for
/// the minute-bucket upsert.
#[derive(Debug, Clone, Copy, Queryable, Selectable, Insertable)]
#[diesel(table_name = dial_values)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DialValueRow {
    pub dial_id: i32,
    pub timestamp: DateTime<Utc>,
    pub value: i32,
}

/// Row struct for reading from the dial_memberships table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = dial_memberships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DialMembershipRow {
    pub id: i32,
    pub dial_id: i32,
    pub user_id: i32,
    pub value: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DialMembershipRow> for DialMembership {
    fn from(row: DialMembershipRow) -> Self {
        Self {
            id: row.id,
            dial_id: row.dial_id,
            dial: None,
            user_id: row.user_id,
            user: None,
            value: row.value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Insertable struct for creating memberships.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = dial_memberships)]
pub(crate) struct NewDialMembershipRow {
    pub dial_id: i32,
    pub user_id: i32,
    pub value: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn user_row_converts_without_attaching_auths() {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        let row = UserRow {
            id: 4,
            name: "ada".to_owned(),
            email: Some("ada@example.com".to_owned()),
            api_key: "key".to_owned(),
            created_at: at,
            updated_at: at,
        };

        let user = User::from(row);
        assert_eq!(user.id, 4);
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert!(user.auths.is_empty());
    }

    #[rstest]
    fn membership_row_converts_with_unresolved_associations() {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        let row = DialMembershipRow {
            id: 9,
            dial_id: 2,
            user_id: 3,
            value: 70,
            created_at: at,
            updated_at: at,
        };

        let membership = DialMembership::from(row);
        assert_eq!(membership.value, 70);
        assert!(membership.dial.is_none());
        assert!(membership.user.is_none());
    }
}
