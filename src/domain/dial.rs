//! Dial data model and the aggregate value rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::Error;
use crate::domain::membership::DialMembership;
use crate::domain::user::User;
use crate::domain::Result;

/// Maximum dial name length in Unicode scalar values.
pub const MAX_DIAL_NAME_LEN: usize = 100;

/// An aggregate gauge shared by a group of users.
///
/// A dial is created by a user and can only be edited and deleted by its
/// owner. Other users join through the invite code; every member contributes
/// a value and the dial's own value is the rounded average of the
/// memberships. Value changes are announced to all members through the
/// event service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dial {
    pub id: i32,

    /// Owner of the dial. The owner always holds a membership row, and that
    /// membership cannot be deleted while the dial exists.
    pub user_id: i32,
    /// Attached on reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Human-readable name, at most [`MAX_DIAL_NAME_LEN`] characters.
    pub name: String,

    /// Random code granting discoverability of the dial through
    /// `find_dials`. Possession does not itself create a membership.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub invite_code: String,

    /// Aggregate level, derived from the membership values. See
    /// [`aggregate_value`].
    pub value: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Members and their contributing values. Attached only when returning
    /// a single dial.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memberships: Vec<DialMembership>,
}

impl Dial {
    /// Returns an error if the dial has invalid fields.
    /// Only performs basic validation.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid("Dial name required."));
        } else if self.name.chars().count() > MAX_DIAL_NAME_LEN {
            return Err(Error::invalid("Dial name too long."));
        } else if self.user_id == 0 {
            return Err(Error::invalid("Dial creator required."));
        }
        Ok(())
    }

    /// The membership attached to this dial for the given user, when
    /// memberships are loaded.
    pub fn membership_for_user(&self, user_id: i32) -> Option<&DialMembership> {
        self.memberships.iter().find(|m| m.user_id == user_id)
    }

    #[cfg(test)]
    pub(crate) fn fixture(id: i32, user_id: i32, name: &str) -> Self {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            id,
            user_id,
            user: None,
            name: name.to_owned(),
            invite_code: String::new(),
            value: 0,
            created_at: at,
            updated_at: at,
            memberships: Vec::new(),
        }
    }
}

/// Recompute a dial's aggregate level from its membership values.
///
/// The result is the average rounded half away from zero; a dial with no
/// memberships levels out at 0. Inputs are each within 0..=100, so the
/// result is as well.
pub fn aggregate_value(member_values: &[i32]) -> i32 {
    if member_values.is_empty() {
        return 0;
    }
    let sum: i64 = member_values.iter().map(|v| i64::from(*v)).sum();
    (sum as f64 / member_values.len() as f64).round() as i32
}

/// Draft accepted by `DialService::create_dial`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDial {
    pub name: String,
}

/// Filter accepted by `DialService::find_dials`.
///
/// Supplying `invite_code` switches the query into public discovery: the
/// code alone decides visibility. Otherwise results are restricted to dials
/// the principal belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialFilter {
    pub id: Option<i32>,
    pub invite_code: Option<String>,

    /// Restrict results to a subset of the total range.
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Set of fields to change via `DialService::update_dial`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialUpdate {
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;
    use rstest::rstest;

    #[rstest]
    fn validate_rejects_empty_name() {
        let mut dial = Dial::fixture(1, 1, "team");
        dial.name.clear();
        let error = dial.validate().expect_err("empty name");
        assert_eq!(error.code(), ErrorCode::Invalid);
        assert_eq!(error.message(), "Dial name required.");
    }

    #[rstest]
    fn validate_counts_name_length_in_scalar_values() {
        // 100 multibyte characters are fine; 101 are not.
        let dial = Dial::fixture(1, 1, &"é".repeat(MAX_DIAL_NAME_LEN));
        assert!(dial.validate().is_ok());

        let dial = Dial::fixture(1, 1, &"é".repeat(MAX_DIAL_NAME_LEN + 1));
        let error = dial.validate().expect_err("name too long");
        assert_eq!(error.code(), ErrorCode::Invalid);
        assert_eq!(error.message(), "Dial name too long.");
    }

    #[rstest]
    fn validate_requires_an_owner() {
        let dial = Dial::fixture(1, 0, "team");
        let error = dial.validate().expect_err("missing owner");
        assert_eq!(error.message(), "Dial creator required.");
    }

    #[rstest]
    #[case(&[], 0)]
    #[case(&[0, 50], 25)]
    #[case(&[0, 60], 30)]
    #[case(&[0, 10], 5)]
    #[case(&[1, 2], 2)] // 1.5 rounds half away from zero
    #[case(&[100, 100, 100], 100)]
    fn aggregate_value_rounds_half_away_from_zero(
        #[case] values: &[i32],
        #[case] expected: i32,
    ) {
        assert_eq!(aggregate_value(values), expected);
    }

    #[rstest]
    fn membership_for_user_finds_attached_member() {
        let mut dial = Dial::fixture(1, 1, "team");
        dial.memberships = vec![
            crate::domain::DialMembership::fixture(10, 1, 1, 0),
            crate::domain::DialMembership::fixture(11, 1, 2, 50),
        ];
        assert_eq!(dial.membership_for_user(2).map(|m| m.id), Some(11));
        assert!(dial.membership_for_user(3).is_none());
    }
}
