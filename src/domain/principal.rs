//! Request-scoped identity.
//!
//! Transports resolve the caller (session cookie, API key, OAuth exchange)
//! into a [`Principal`] once per request and pass it into every service
//! call. Services only read it; nothing in this layer can change who the
//! caller is mid-request, and concurrent requests carry independent values.

use std::sync::Arc;

use crate::domain::user::User;

/// The authenticated user associated with the current operation, or absent.
///
/// Cloning is cheap (the user record is shared), so adapters can stash the
/// principal alongside the request without copying the underlying user.
#[derive(Debug, Clone, Default)]
pub struct Principal(Option<Arc<User>>);

impl Principal {
    /// A principal with nobody logged in.
    pub fn anonymous() -> Self {
        Self(None)
    }

    /// A principal for the given authenticated user.
    pub fn from_user(user: User) -> Self {
        Self(Some(Arc::new(user)))
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&User> {
        self.0.as_deref()
    }

    /// The authenticated user's id, or 0 if nobody is logged in.
    ///
    /// Zero is never a valid row id, so visibility filters can use this
    /// directly without special-casing the anonymous principal.
    pub fn user_id(&self) -> i32 {
        self.user().map_or(0, |user| user.id)
    }

    /// True when nobody is logged in.
    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::User;
    use rstest::rstest;

    #[rstest]
    fn anonymous_principal_has_zero_user_id() {
        let principal = Principal::anonymous();
        assert!(principal.is_anonymous());
        assert_eq!(principal.user_id(), 0);
        assert!(principal.user().is_none());
    }

    #[rstest]
    fn authenticated_principal_exposes_user() {
        let principal = Principal::from_user(User::fixture(7, "ada"));
        assert!(!principal.is_anonymous());
        assert_eq!(principal.user_id(), 7);
        assert_eq!(principal.user().map(|u| u.name.as_str()), Some("ada"));
    }

    #[rstest]
    fn clones_share_the_same_user() {
        let principal = Principal::from_user(User::fixture(3, "grace"));
        let clone = principal.clone();
        assert_eq!(clone.user_id(), principal.user_id());
    }
}
