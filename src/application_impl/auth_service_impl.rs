use super::timeout::{DEFAULT_CALL_TIMEOUT, bounded};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::{IdentityError, IdentityProvider};
use crate::logger::*;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use url::Url;

pub const MIN_PASSWORD_LEN: usize = 8;

const CONFIRM_EMAIL_MESSAGE: &str = "Please check your email to confirm your account";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AuthError::Validation("Invalid email address".to_string()))
    }
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Backend unreachable is never the caller's fault.
fn transient(e: IdentityError) -> AuthError {
    AuthError::InternalError(e.to_string())
}

pub struct RealAuthService {
    identity: Arc<dyn IdentityProvider>,
    email_redirect: Url,
    password_reset_redirect: Url,
    call_timeout: Duration,
}

impl RealAuthService {
    pub fn new(identity: Arc<dyn IdentityProvider>, frontend_url: &Url) -> anyhow::Result<Self> {
        let base = frontend_url.as_str().trim_end_matches('/');
        Ok(Self {
            identity,
            email_redirect: Url::parse(&format!("{base}/auth/callback"))?,
            password_reset_redirect: Url::parse(&format!("{base}/auth/reset-password"))?,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    fn session_or_unauthorized(
        result: Result<Session, IdentityError>,
        message: &str,
    ) -> Result<AuthResponse, AuthError> {
        match result {
            Ok(session) => Ok(AuthResponse::from_session(&session)),
            Err(e) if e.is_transient() => Err(transient(e)),
            Err(e) => {
                debug!(error = %e, "{}", message);
                Err(AuthError::Unauthorized(message.to_string()))
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn signup(&self, request: SignupInput) -> Result<AuthResponse, AuthError> {
        let SignupInput { email, password } = request;
        validate_email(&email)?;
        validate_password(&password)?;

        let result = bounded(
            self.call_timeout,
            self.identity.sign_up(&email, &password, &self.email_redirect),
        )
        .await
        .map_err(|e| match e {
            IdentityError::AlreadyRegistered => {
                AuthError::Conflict("Email already registered".to_string())
            }
            IdentityError::Rejected { message, .. } => AuthError::Validation(message),
            e => transient(e),
        })?;

        match result.session {
            Some(session) => {
                info!(user_id = %result.user.id, %email, "user signed up");
                Ok(AuthResponse::from_session(&session))
            }
            None => {
                info!(user_id = %result.user.id, %email, "user signed up, email confirmation required");
                Ok(AuthResponse {
                    user: result.user,
                    tokens: None,
                    message: Some(CONFIRM_EMAIL_MESSAGE.to_string()),
                })
            }
        }
    }

    async fn login(&self, request: LoginInput) -> Result<AuthResponse, AuthError> {
        let LoginInput { email, password } = request;
        // Password policy belongs to signup; the provider judges credentials.
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let result = bounded(
            self.call_timeout,
            self.identity.sign_in_with_password(&email, &password),
        )
        .await;
        let response = Self::session_or_unauthorized(result, "Invalid email or password")?;
        info!(user_id = %response.user.id, "user logged in");
        Ok(response)
    }

    async fn login_with_otp(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;

        bounded(
            self.call_timeout,
            self.identity.sign_in_with_otp(email, &self.email_redirect),
        )
        .await
        .map_err(|e| match e {
            IdentityError::Rejected { message, .. } => AuthError::Validation(message),
            e => transient(e),
        })?;
        info!(%email, "otp sent");
        Ok(())
    }

    async fn verify_otp(&self, email: &str, code: &str) -> Result<AuthResponse, AuthError> {
        validate_email(email)?;
        if code.trim().is_empty() {
            return Err(AuthError::Validation("OTP code is required".to_string()));
        }

        let result = bounded(self.call_timeout, self.identity.verify_otp(email, code.trim())).await;
        let response = Self::session_or_unauthorized(result, "Invalid or expired OTP")?;
        info!(user_id = %response.user.id, "otp verified");
        Ok(response)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let result = bounded(
            self.call_timeout,
            self.identity.refresh_session(refresh_token),
        )
        .await;
        let response = Self::session_or_unauthorized(result, "Invalid refresh token")?;
        info!(user_id = %response.user.id, "token refreshed");
        Ok(response)
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        match bounded(self.call_timeout, self.identity.sign_out(access_token)).await {
            Ok(()) => {
                info!("user logged out");
                Ok(())
            }
            Err(e) if e.is_transient() => Err(transient(e)),
            Err(e) => {
                // The session is already gone upstream.
                debug!(error = %e, "sign out rejected");
                Ok(())
            }
        }
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;

        bounded(
            self.call_timeout,
            self.identity
                .reset_password_for_email(email, &self.password_reset_redirect),
        )
        .await
        .map_err(|e| match e {
            IdentityError::Rejected { message, .. } => AuthError::Validation(message),
            e => transient(e),
        })?;
        info!(%email, "password reset requested");
        Ok(())
    }

    async fn reset_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password)?;

        bounded(
            self.call_timeout,
            self.identity.update_user_password(access_token, new_password),
        )
        .await
        .map_err(|e| match e {
            IdentityError::Rejected { message, .. } => AuthError::Validation(message),
            e => transient(e),
        })?;
        info!("password reset");
        Ok(())
    }

    async fn verify_token(&self, token: &str) -> Result<User, AuthError> {
        match bounded(self.call_timeout, self.identity.get_user(token)).await {
            Ok(user) => Ok(user),
            Err(e) if e.is_transient() => Err(transient(e)),
            Err(e) => {
                debug!(error = %e, "token verification failed");
                Err(AuthError::Unauthorized("Invalid token".to_string()))
            }
        }
    }
}
