//! OAuth identity bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::Error;
use crate::domain::user::{NewUser, User};
use crate::domain::Result;

/// Authentication source for GitHub OAuth. Currently the only supported
/// provider, but nothing below the transport assumes a single source.
pub const AUTH_SOURCE_GITHUB: &str = "github";

/// A set of OAuth credentials linking a user to an external provider
/// identity.
///
/// ## Invariants
/// - `(user_id, source)` is unique: one binding per provider per user.
/// - `(source, source_id)` is unique: a provider identity links one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    pub id: i32,

    /// Owning user.
    pub user_id: i32,
    /// Attached on reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Provider name (`github`) and the provider-side user id.
    pub source: String,
    pub source_id: String,

    /// OAuth tokens from the provider. GitHub issues no refresh tokens, but
    /// the field exists for future providers. Never serialized.
    #[serde(skip_serializing, default)]
    pub access_token: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: String,
    #[serde(skip_serializing, default)]
    pub expiry: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auth {
    /// Returns an error if any fields are invalid on the binding.
    /// Only performs basic validation.
    pub fn validate(&self) -> Result<()> {
        if self.user_id == 0 {
            return Err(Error::invalid("User required."));
        } else if self.source.is_empty() {
            return Err(Error::invalid("Source required."));
        } else if self.source_id.is_empty() {
            return Err(Error::invalid("Source ID required."));
        } else if self.access_token.is_empty() {
            return Err(Error::invalid("Access token required."));
        }
        Ok(())
    }

    /// URL of the avatar image hosted by the provider, sized to `size`
    /// pixels. Returns `None` for providers without a known avatar scheme.
    pub fn avatar_url(&self, size: u32) -> Option<String> {
        match self.source.as_str() {
            AUTH_SOURCE_GITHUB => Some(format!(
                "https://avatars1.githubusercontent.com/u/{}?s={}",
                self.source_id, size
            )),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn fixture(id: i32, user_id: i32, source: &str, source_id: &str) -> Self {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            id,
            user_id,
            user: None,
            source: source.to_owned(),
            source_id: source_id.to_owned(),
            access_token: "token".to_owned(),
            refresh_token: String::new(),
            expiry: None,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Draft accepted by `AuthService::create_auth`.
///
/// When `user_id` is unset and `user` is present, the service links the
/// binding to an existing user by unique email or creates a new user from
/// the draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuth {
    #[serde(default)]
    pub user_id: Option<i32>,
    #[serde(default)]
    pub user: Option<NewUser>,

    pub source: String,
    pub source_id: String,

    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

/// Filter accepted by `AuthService::find_auths`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFilter {
    pub id: Option<i32>,
    pub user_id: Option<i32>,
    pub source: Option<String>,
    pub source_id: Option<String>,

    /// Restrict results to a subset of the total range.
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(0, "github", "1", "t", "User required.")]
    #[case(1, "", "1", "t", "Source required.")]
    #[case(1, "github", "", "t", "Source ID required.")]
    #[case(1, "github", "1", "", "Access token required.")]
    fn validate_rejects_missing_fields(
        #[case] user_id: i32,
        #[case] source: &str,
        #[case] source_id: &str,
        #[case] access_token: &str,
        #[case] message: &str,
    ) {
        let mut auth = Auth::fixture(1, user_id, source, source_id);
        auth.access_token = access_token.to_owned();
        let error = auth.validate().expect_err("invalid auth");
        assert_eq!(error.code(), ErrorCode::Invalid);
        assert_eq!(error.message(), message);
    }

    #[rstest]
    fn validate_accepts_complete_binding() {
        let auth = Auth::fixture(1, 2, AUTH_SOURCE_GITHUB, "42");
        assert!(auth.validate().is_ok());
    }

    #[rstest]
    fn avatar_url_known_only_for_github() {
        let github = Auth::fixture(1, 2, AUTH_SOURCE_GITHUB, "42");
        let other = Auth::fixture(2, 2, "gitlab", "42");
        assert_eq!(
            github.avatar_url(128).as_deref(),
            Some("https://avatars1.githubusercontent.com/u/42?s=128")
        );
        assert!(other.avatar_url(128).is_none());
    }

    #[rstest]
    fn tokens_are_never_serialized() {
        let auth = Auth::fixture(1, 2, AUTH_SOURCE_GITHUB, "42");
        let encoded = serde_json::to_value(&auth).expect("serialize");
        assert!(encoded.get("accessToken").is_none());
        assert!(encoded.get("refreshToken").is_none());
        assert!(encoded.get("expiry").is_none());
    }
}
