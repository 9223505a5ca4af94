//! Dial membership data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::dial::Dial;
use crate::domain::error::Error;
use crate::domain::user::User;
use crate::domain::Result;

/// A single user's contribution to a dial.
///
/// All members can see each other's values, but only the membership's own
/// user may change its value. Updating the value recomputes the parent
/// dial's aggregate level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialMembership {
    pub id: i32,

    /// Parent dial.
    pub dial_id: i32,
    /// Attached on reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dial: Option<Dial>,

    /// Owner of the membership.
    pub user_id: i32,
    /// Attached on reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// This user's current contribution, within 0..=100.
    pub value: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DialMembership {
    /// Returns an error if membership fields are invalid.
    /// Only performs basic validation.
    pub fn validate(&self) -> Result<()> {
        if self.dial_id == 0 {
            return Err(Error::invalid("Dial required for membership."));
        } else if self.user_id == 0 {
            return Err(Error::invalid("User required for membership."));
        }
        validate_membership_value(self.value)
    }

    #[cfg(test)]
    pub(crate) fn fixture(id: i32, dial_id: i32, user_id: i32, value: i32) -> Self {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            id,
            dial_id,
            dial: None,
            user_id,
            user: None,
            value,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Returns an error unless `value` lies within the dial range 0..=100.
pub fn validate_membership_value(value: i32) -> Result<()> {
    if !(0..=100).contains(&value) {
        return Err(Error::invalid("Dial value must be between 0 & 100."));
    }
    Ok(())
}

/// Authorization rule for deleting a membership.
///
/// The dial owner's own membership is never deletable while the dial exists,
/// ahead of any permission question. After that, the dial owner and the
/// membership's own user may delete; everyone else may not.
pub fn authorize_membership_delete(
    membership_user_id: i32,
    dial_owner_id: i32,
    principal_id: i32,
) -> Result<()> {
    if membership_user_id == dial_owner_id {
        return Err(Error::conflict(
            "Dial owner may not delete their own membership.",
        ));
    }
    if principal_id != dial_owner_id && principal_id != membership_user_id {
        return Err(Error::unauthorized(
            "You do not have permission to delete the dial membership.",
        ));
    }
    Ok(())
}

/// Draft accepted by `DialMembershipService::create_dial_membership`.
///
/// The membership is always created for the calling principal; the draft
/// deliberately carries no user id, so impersonation is unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDialMembership {
    pub dial_id: i32,
    #[serde(default)]
    pub value: i32,
}

/// Sort orders supported by `find_dial_memberships`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialMembershipSortBy {
    /// The principal's own membership first, then remaining members by
    /// user name ascending.
    #[default]
    Default,
    UpdatedAtDesc,
}

/// Filter accepted by `DialMembershipService::find_dial_memberships`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialMembershipFilter {
    pub id: Option<i32>,
    pub dial_id: Option<i32>,
    pub user_id: Option<i32>,

    /// Restrict results to a subset of the total range.
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: Option<i64>,

    #[serde(default)]
    pub sort_by: DialMembershipSortBy,
}

/// Set of fields to change via `DialMembershipService::update_dial_membership`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialMembershipUpdate {
    pub value: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(-1)]
    #[case(101)]
    fn validate_rejects_out_of_range_values(#[case] value: i32) {
        let membership = DialMembership::fixture(1, 1, 1, value);
        let error = membership.validate().expect_err("out of range");
        assert_eq!(error.code(), ErrorCode::Invalid);
        assert_eq!(error.message(), "Dial value must be between 0 & 100.");
    }

    #[rstest]
    #[case(0)]
    #[case(100)]
    fn validate_accepts_boundary_values(#[case] value: i32) {
        let membership = DialMembership::fixture(1, 1, 1, value);
        assert!(membership.validate().is_ok());
    }

    #[rstest]
    fn validate_requires_dial_and_user() {
        let missing_dial = DialMembership::fixture(1, 0, 1, 0);
        assert_eq!(
            missing_dial.validate().expect_err("no dial").message(),
            "Dial required for membership."
        );

        let missing_user = DialMembership::fixture(1, 1, 0, 0);
        assert_eq!(
            missing_user.validate().expect_err("no user").message(),
            "User required for membership."
        );
    }

    #[rstest]
    fn owner_membership_deletion_is_a_conflict_for_everyone() {
        // Even the owner themselves cannot remove their own membership.
        let error = authorize_membership_delete(1, 1, 1).expect_err("owner self-delete");
        assert_eq!(error.code(), ErrorCode::Conflict);

        // Another member trying to remove the owner's membership hits the
        // same rule first.
        let error = authorize_membership_delete(1, 1, 2).expect_err("member deletes owner");
        assert_eq!(error.code(), ErrorCode::Conflict);
    }

    #[rstest]
    #[case(2, 1, 1)] // dial owner removes a member
    #[case(2, 1, 2)] // member removes themselves
    fn dial_owner_and_member_may_delete(
        #[case] membership_user_id: i32,
        #[case] dial_owner_id: i32,
        #[case] principal_id: i32,
    ) {
        assert!(
            authorize_membership_delete(membership_user_id, dial_owner_id, principal_id).is_ok()
        );
    }

    #[rstest]
    fn bystanders_may_not_delete_memberships() {
        let error = authorize_membership_delete(2, 1, 3).expect_err("third party");
        assert_eq!(error.code(), ErrorCode::Unauthorized);
    }

    #[rstest]
    fn sort_by_defaults_to_own_membership_first() {
        assert_eq!(
            DialMembershipFilter::default().sort_by,
            DialMembershipSortBy::Default
        );
    }

    #[rstest]
    fn sort_by_serializes_snake_case() {
        let encoded =
            serde_json::to_value(DialMembershipSortBy::UpdatedAtDesc).expect("serialize");
        assert_eq!(encoded, serde_json::json!("updated_at_desc"));
    }
}
