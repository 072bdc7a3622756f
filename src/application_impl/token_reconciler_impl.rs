use super::timeout::{DEFAULT_CALL_TIMEOUT, bounded};
use crate::application_port::{ReconcileError, TokenReconciler};
use crate::domain_model::*;
use crate::domain_port::{IdentityError, IdentityProvider};
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;

/// Staged fallback over the identity provider: introspect the access token,
/// then try the refresh token, and only then give up.
///
/// Issues at most two calls per validation, strictly one after the other.
/// Holds no per-request state.
pub struct RealTokenReconciler {
    identity: Arc<dyn IdentityProvider>,
    call_timeout: Duration,
}

impl RealTokenReconciler {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    async fn introspect(&self, access_token: &str) -> Result<User, IdentityError> {
        bounded(self.call_timeout, self.identity.get_user(access_token)).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        bounded(self.call_timeout, self.identity.refresh_session(refresh_token)).await
    }
}

#[async_trait::async_trait]
impl TokenReconciler for RealTokenReconciler {
    async fn validate(
        &self,
        credentials: CredentialBundle,
    ) -> Result<ValidationOutcome, ReconcileError> {
        let CredentialBundle {
            access_token,
            refresh_token,
        } = credentials;

        // Introspection failures of any kind fall through to the refresh step.
        let mut introspection_error = None;
        if let Some(access_token) = access_token.as_deref() {
            match self.introspect(access_token).await {
                Ok(user) => {
                    debug!(user_id = %user.id, "access token accepted");
                    return Ok(ValidationOutcome::Valid(user));
                }
                Err(e) => {
                    debug!(error = %e, "access token introspection failed");
                    introspection_error = Some(e);
                }
            }
        }

        let Some(refresh_token) = refresh_token else {
            return match introspection_error {
                None => Ok(ValidationOutcome::Invalid(InvalidReason::NoTokens)),
                Some(e) if e.is_transient() => {
                    warn!(error = %e, "cannot introspect access token");
                    Err(ReconcileError::Unavailable(e.to_string()))
                }
                Some(_) => Ok(ValidationOutcome::Invalid(
                    InvalidReason::AccessExpiredNoRefresh,
                )),
            };
        };

        match self.refresh(&refresh_token).await {
            Ok(session) => {
                info!(user_id = %session.user.id, "session refreshed");
                Ok(ValidationOutcome::Refreshed(session))
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "cannot refresh session");
                Err(ReconcileError::Unavailable(e.to_string()))
            }
            Err(e) => {
                info!(error = %e, "refresh token rejected");
                Ok(ValidationOutcome::Invalid(InvalidReason::RefreshFailed))
            }
        }
    }
}
