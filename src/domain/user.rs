//! User data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::auth::Auth;
use crate::domain::error::Error;
use crate::domain::Result;

/// A registered user.
///
/// Users are typically created through the OAuth link-or-create flow in the
/// auth service, but can also be created directly (tests, seeding).
///
/// ## Invariants
/// - `name` is non-empty.
/// - `email`, when present, is unique across users.
/// - `api_key` is a unique 256-bit random hex secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,

    /// Preferred display name.
    pub name: String,

    /// Optional contact email; empty submissions are stored as absent so the
    /// uniqueness constraint only applies to real addresses.
    pub email: Option<String>,

    /// Randomly generated API key for non-browser clients. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Identity bindings attached on single-object reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auths: Vec<Auth>,
}

impl User {
    /// Returns an error if the user record has invalid fields.
    /// Only performs basic validation.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid("User name required."));
        }
        Ok(())
    }

    /// URL of the first available avatar across the user's identity
    /// bindings. Returns `None` when no binding provides one.
    pub fn avatar_url(&self, size: u32) -> Option<String> {
        self.auths.iter().find_map(|auth| auth.avatar_url(size))
    }

    #[cfg(test)]
    pub(crate) fn fixture(id: i32, name: &str) -> Self {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            id,
            name: name.to_owned(),
            email: None,
            api_key: String::new(),
            created_at: at,
            updated_at: at,
            auths: Vec::new(),
        }
    }
}

/// Draft accepted by `UserService::create_user`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    /// Empty submissions are normalized to absent before storage.
    #[serde(default)]
    pub email: Option<String>,
}

/// Filter accepted by `UserService::find_users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub id: Option<i32>,
    pub email: Option<String>,
    pub api_key: Option<String>,

    /// Restrict results to a subset of the total range.
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Set of fields to change via `UserService::update_user`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::Auth;
    use crate::domain::error::ErrorCode;
    use rstest::rstest;

    #[rstest]
    fn validate_rejects_empty_name() {
        let mut user = User::fixture(1, "ada");
        user.name.clear();
        let error = user.validate().expect_err("empty name");
        assert_eq!(error.code(), ErrorCode::Invalid);
        assert_eq!(error.message(), "User name required.");
    }

    #[rstest]
    fn validate_accepts_named_user_without_email() {
        let user = User::fixture(1, "ada");
        assert!(user.validate().is_ok());
    }

    #[rstest]
    fn avatar_url_picks_first_binding_with_avatar() {
        let mut user = User::fixture(1, "ada");
        user.auths = vec![
            Auth::fixture(1, 1, "unknown-source", "9"),
            Auth::fixture(2, 1, crate::domain::AUTH_SOURCE_GITHUB, "42"),
        ];
        let url = user.avatar_url(64).expect("github avatar");
        assert!(url.contains("42"));
        assert!(url.ends_with("s=64"));
    }

    #[rstest]
    fn api_key_is_never_serialized() {
        let mut user = User::fixture(1, "ada");
        user.api_key = "super-secret".to_owned();
        let encoded = serde_json::to_value(&user).expect("serialize");
        assert!(encoded.get("apiKey").is_none());
    }
}
