use crate::domain_model::*;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The backend answered and refused the request (bad credentials, expired
    /// token, malformed input).
    #[error("rejected by identity provider: {message}")]
    Rejected { status: Option<u16>, message: String },
    #[error("user already registered")]
    AlreadyRegistered,
    /// The backend could not be reached or answered with something unusable.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("identity provider timed out")]
    Timeout,
}

impl IdentityError {
    pub fn rejected(message: impl Into<String>) -> Self {
        IdentityError::Rejected {
            status: None,
            message: message.into(),
        }
    }

    /// True when the failure says nothing about the credentials themselves.
    pub fn is_transient(&self) -> bool {
        matches!(self, IdentityError::Unavailable(_) | IdentityError::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpResult {
    pub user: User,
    /// `None` when the backend wants the email confirmed first.
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRequest {
    pub provider: AuthProvider,
    pub redirect_to: Url,
    pub scopes: String,
    /// S256 PKCE challenge.
    pub code_challenge: String,
}

/// The external service of record for credentials and sessions.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &Url,
    ) -> Result<SignUpResult, IdentityError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError>;

    async fn sign_in_with_otp(&self, email: &str, redirect_to: &Url)
    -> Result<(), IdentityError>;

    async fn verify_otp(&self, email: &str, code: &str) -> Result<Session, IdentityError>;

    async fn get_user(&self, access_token: &str) -> Result<User, IdentityError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &Url,
    ) -> Result<(), IdentityError>;

    async fn update_user_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    async fn oauth_authorization_url(&self, request: &OAuthRequest) -> Result<Url, IdentityError>;

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<Session, IdentityError>;
}
