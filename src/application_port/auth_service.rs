use crate::domain_model::*;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone)]
pub struct SignupInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<AuthTokens>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthResponse {
    pub fn from_session(session: &Session) -> Self {
        AuthResponse {
            user: session.user.clone(),
            tokens: Some(session.tokens()),
            message: None,
        }
    }
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn signup(&self, request: SignupInput) -> Result<AuthResponse, AuthError>;
    async fn login(&self, request: LoginInput) -> Result<AuthResponse, AuthError>;
    async fn login_with_otp(&self, email: &str) -> Result<(), AuthError>;
    async fn verify_otp(&self, email: &str, code: &str) -> Result<AuthResponse, AuthError>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, AuthError>;
    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;
    async fn reset_password(&self, access_token: &str, new_password: &str)
    -> Result<(), AuthError>;
    async fn verify_token(&self, token: &str) -> Result<User, AuthError>;
}
