use super::{AuthError, AuthResponse};
use crate::domain_model::AuthProvider;

/// Authorization URL plus the PKCE verifier the caller must keep until the
/// callback arrives.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub code_verifier: String,
}

#[async_trait::async_trait]
pub trait OAuthService: Send + Sync {
    async fn authorization_url(
        &self,
        provider: AuthProvider,
    ) -> Result<AuthorizationRequest, AuthError>;

    async fn handle_callback(
        &self,
        provider: AuthProvider,
        code: &str,
        code_verifier: &str,
    ) -> Result<AuthResponse, AuthError>;
}
