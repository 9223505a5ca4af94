//! Domain error representation shared across adapters.
//!
//! Keep this module free from HTTP or framework concerns so the same error
//! shape can be mapped by any adapter (HTTP status codes, CLI exit codes,
//! WebSocket close frames).

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Stable machine-readable error kind.
///
/// The set is closed: every failure an operation can surface carries exactly
/// one of these kinds, and the kind alone decides the client-visible mapping
/// in the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Input failed validation (missing field, out of range, too long).
    Invalid,
    /// Principal absent or lacks permission for this action.
    Unauthorized,
    /// Target does not exist or is invisible to the principal. The two are
    /// deliberately conflated to avoid leaking existence.
    NotFound,
    /// State-rule violation (e.g. a dial owner deleting their own
    /// membership).
    Conflict,
    /// Interface method intentionally absent in a specific implementation.
    NotImplemented,
    /// Every other failure: I/O, unmapped constraint violations, recovered
    /// panics.
    Internal,
}

/// Domain error carrying a kind and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Stable machine-readable error kind.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message returned to clients.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Convenience constructor for [`ErrorCode::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }

    /// Convenience constructor for [`ErrorCode::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::NotImplemented`].
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }

    /// Convenience constructor for [`ErrorCode::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::invalid("bad"), ErrorCode::Invalid)]
    #[case(Error::unauthorized("nope"), ErrorCode::Unauthorized)]
    #[case(Error::not_found("missing"), ErrorCode::NotFound)]
    #[case(Error::conflict("clash"), ErrorCode::Conflict)]
    #[case(Error::not_implemented("todo"), ErrorCode::NotImplemented)]
    #[case(Error::internal("boom"), ErrorCode::Internal)]
    fn constructors_set_expected_code(#[case] error: Error, #[case] code: ErrorCode) {
        assert_eq!(error.code(), code);
    }

    #[rstest]
    fn display_shows_message() {
        let error = Error::conflict("Dial owner may not delete their own membership.");
        assert_eq!(
            error.to_string(),
            "Dial owner may not delete their own membership."
        );
    }

    #[rstest]
    fn code_serializes_snake_case() {
        let encoded = serde_json::to_value(ErrorCode::NotImplemented).expect("serialize");
        assert_eq!(encoded, serde_json::json!("not_implemented"));
    }
}
