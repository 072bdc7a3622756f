use super::{Session, User};
use std::fmt;

/// Why a credential bundle could not be turned into an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NoTokens,
    AccessExpiredNoRefresh,
    RefreshFailed,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::NoTokens => "no_tokens",
            InvalidReason::AccessExpiredNoRefresh => "access_expired_no_refresh",
            InvalidReason::RefreshFailed => "refresh_failed",
        }
    }

    /// Client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            InvalidReason::NoTokens => "No tokens provided",
            InvalidReason::AccessExpiredNoRefresh => {
                "Access token expired and no refresh token provided"
            }
            InvalidReason::RefreshFailed => "Token refresh failed",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of reconciling one request's credentials. Consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(User),
    Refreshed(Session),
    Invalid(InvalidReason),
}

impl ValidationOutcome {
    pub fn user(&self) -> Option<&User> {
        match self {
            ValidationOutcome::Valid(user) => Some(user),
            ValidationOutcome::Refreshed(session) => Some(&session.user),
            ValidationOutcome::Invalid(_) => None,
        }
    }
}
