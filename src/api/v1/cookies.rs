use crate::domain_model::{AuthTokens, ValidationOutcome};
use cookie::{Cookie, SameSite};
use time::Duration;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const PKCE_COOKIE: &str = "oauthCodeVerifier";

/// Refresh cookies follow our own retention policy, not the backend's expiry.
pub const REFRESH_COOKIE_TTL: Duration = Duration::days(7);
pub const PKCE_COOKIE_TTL: Duration = Duration::minutes(5);
pub const PKCE_COOKIE_PATH: &str = "/api/v1/auth/oauth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
}

/// What a response does to the session cookie pair. The pair is always
/// written or cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieAction {
    Keep,
    SetPair {
        access_token: String,
        refresh_token: String,
        access_max_age_secs: u64,
    },
    ClearPair,
}

impl CookieAction {
    pub fn for_outcome(outcome: &ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Valid(_) => CookieAction::Keep,
            ValidationOutcome::Refreshed(session) => CookieAction::for_tokens(&session.tokens()),
            ValidationOutcome::Invalid(_) => CookieAction::ClearPair,
        }
    }

    pub fn for_tokens(tokens: &AuthTokens) -> Self {
        CookieAction::SetPair {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            access_max_age_secs: tokens.expires_in,
        }
    }

    pub fn into_cookies(self, policy: CookiePolicy) -> Vec<Cookie<'static>> {
        match self {
            CookieAction::Keep => Vec::new(),
            CookieAction::SetPair {
                access_token,
                refresh_token,
                access_max_age_secs,
            } => vec![
                session_cookie(
                    ACCESS_COOKIE,
                    access_token,
                    Duration::seconds(access_max_age_secs.min(i64::MAX as u64) as i64),
                    policy,
                ),
                session_cookie(REFRESH_COOKIE, refresh_token, REFRESH_COOKIE_TTL, policy),
            ],
            CookieAction::ClearPair => vec![
                session_cookie(ACCESS_COOKIE, String::new(), Duration::ZERO, policy),
                session_cookie(REFRESH_COOKIE, String::new(), Duration::ZERO, policy),
            ],
        }
    }
}

fn session_cookie(
    name: &'static str,
    value: String,
    max_age: Duration,
    policy: CookiePolicy,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Holds the PKCE verifier between the authorize redirect and the callback.
pub fn pkce_cookie(code_verifier: String, policy: CookiePolicy) -> Cookie<'static> {
    Cookie::build((PKCE_COOKIE, code_verifier))
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Lax)
        .path(PKCE_COOKIE_PATH)
        .max_age(PKCE_COOKIE_TTL)
        .build()
}

pub fn clear_pkce_cookie(policy: CookiePolicy) -> Cookie<'static> {
    Cookie::build((PKCE_COOKIE, ""))
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Lax)
        .path(PKCE_COOKIE_PATH)
        .max_age(Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::*;
    use chrono::Utc;

    const LAX: CookiePolicy = CookiePolicy { secure: false };

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId(uuid::Uuid::nil()),
            email: "test@example.com".into(),
            email_verified: true,
            provider: AuthProvider::Email,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_keeps_cookies() {
        let action = CookieAction::for_outcome(&ValidationOutcome::Valid(user()));
        assert_eq!(action, CookieAction::Keep);
        assert!(action.into_cookies(LAX).is_empty());
    }

    #[test]
    fn every_invalid_reason_clears_the_pair() {
        for reason in [
            InvalidReason::NoTokens,
            InvalidReason::AccessExpiredNoRefresh,
            InvalidReason::RefreshFailed,
        ] {
            let cookies =
                CookieAction::for_outcome(&ValidationOutcome::Invalid(reason)).into_cookies(LAX);
            let names: Vec<_> = cookies.iter().map(|c| c.name().to_string()).collect();
            assert_eq!(names, vec![ACCESS_COOKIE, REFRESH_COOKIE], "{reason}");
            assert!(cookies.iter().all(|c| c.value().is_empty()));
            assert!(cookies.iter().all(|c| c.max_age() == Some(Duration::ZERO)));
        }
    }

    #[test]
    fn refreshed_sets_pair_with_asymmetric_lifetimes() {
        let session = Session {
            user: user(),
            access_token: "new-a".into(),
            refresh_token: "new-r".into(),
            expires_in_seconds: 3600,
        };
        let cookies =
            CookieAction::for_outcome(&ValidationOutcome::Refreshed(session)).into_cookies(LAX);

        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name(), ACCESS_COOKIE);
        assert_eq!(cookies[0].value(), "new-a");
        assert_eq!(cookies[0].max_age(), Some(Duration::seconds(3600)));
        assert_eq!(cookies[1].name(), REFRESH_COOKIE);
        assert_eq!(cookies[1].value(), "new-r");
        assert_eq!(cookies[1].max_age(), Some(Duration::days(7)));
    }

    #[test]
    fn session_cookie_attributes() {
        let tokens = AuthTokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_in: 60,
        };
        for cookie in CookieAction::for_tokens(&tokens).into_cookies(CookiePolicy { secure: true })
        {
            assert_eq!(cookie.http_only(), Some(true));
            assert_eq!(cookie.secure(), Some(true));
            assert_eq!(cookie.same_site(), Some(SameSite::Strict));
            assert_eq!(cookie.path(), Some("/"));
        }
        for cookie in CookieAction::for_tokens(&tokens).into_cookies(LAX) {
            assert_eq!(cookie.secure(), Some(false));
        }
    }

    #[test]
    fn pkce_cookie_is_scoped_and_short_lived() {
        let cookie = pkce_cookie("verifier".into(), LAX);
        assert_eq!(cookie.path(), Some(PKCE_COOKIE_PATH));
        assert_eq!(cookie.max_age(), Some(PKCE_COOKIE_TTL));
        assert_eq!(clear_pkce_cookie(LAX).value(), "");
    }
}
