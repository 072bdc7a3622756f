use super::timeout::{DEFAULT_CALL_TIMEOUT, bounded};
use crate::application_port::*;
use crate::domain_model::AuthProvider;
use crate::domain_port::{IdentityProvider, OAuthRequest};
use crate::logger::*;
use crate::pkce;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct RealOAuthService {
    identity: Arc<dyn IdentityProvider>,
    frontend_url: Url,
    call_timeout: Duration,
}

impl RealOAuthService {
    pub fn new(identity: Arc<dyn IdentityProvider>, frontend_url: Url) -> Self {
        Self {
            identity,
            frontend_url,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    fn scopes(provider: AuthProvider) -> Result<&'static str, AuthError> {
        match provider {
            AuthProvider::Google => Ok("email profile"),
            AuthProvider::Apple => Ok("email name"),
            AuthProvider::Email => Err(AuthError::Validation(
                "Unsupported OAuth provider: email".to_string(),
            )),
        }
    }

    fn redirect_to(&self, provider: AuthProvider) -> Result<Url, AuthError> {
        let base = self.frontend_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/auth/{provider}/callback"))
            .map_err(|e| AuthError::InternalError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl OAuthService for RealOAuthService {
    async fn authorization_url(
        &self,
        provider: AuthProvider,
    ) -> Result<AuthorizationRequest, AuthError> {
        let scopes = Self::scopes(provider)?;
        let code_verifier = pkce::generate_code_verifier();
        let request = OAuthRequest {
            provider,
            redirect_to: self.redirect_to(provider)?,
            scopes: scopes.to_string(),
            code_challenge: pkce::generate_code_challenge(&code_verifier),
        };

        let url = bounded(
            self.call_timeout,
            self.identity.oauth_authorization_url(&request),
        )
        .await
        .map_err(|e| {
            warn!(%provider, error = %e, "authorization url failed");
            if e.is_transient() {
                AuthError::InternalError(e.to_string())
            } else {
                AuthError::Validation(format!("Failed to generate {provider} authorization URL"))
            }
        })?;

        info!(%provider, "oauth authorization url generated");
        Ok(AuthorizationRequest {
            url: url.into(),
            code_verifier,
        })
    }

    async fn handle_callback(
        &self,
        provider: AuthProvider,
        code: &str,
        code_verifier: &str,
    ) -> Result<AuthResponse, AuthError> {
        Self::scopes(provider)?;
        if code.trim().is_empty() {
            return Err(AuthError::Validation("Authorization code is required".to_string()));
        }

        let session = bounded(
            self.call_timeout,
            self.identity.exchange_code_for_session(code, code_verifier),
        )
        .await
        .map_err(|e| {
            warn!(%provider, error = %e, "oauth code exchange failed");
            if e.is_transient() {
                AuthError::InternalError(e.to_string())
            } else {
                AuthError::Unauthorized("Failed to authenticate with OAuth provider".to_string())
            }
        })?;

        let mut response = AuthResponse::from_session(&session);
        response.user.provider = provider;
        info!(%provider, user_id = %response.user.id, "oauth callback handled");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::InMemoryIdentityProvider;

    fn service(identity: &Arc<InMemoryIdentityProvider>) -> RealOAuthService {
        RealOAuthService::new(identity.clone(), Url::parse("http://localhost:3000").unwrap())
    }

    #[tokio::test]
    async fn google_url_carries_scopes_redirect_and_challenge() {
        let identity = Arc::new(InMemoryIdentityProvider::new());
        let request = service(&identity)
            .authorization_url(AuthProvider::Google)
            .await
            .unwrap();

        let url = Url::parse(&request.url).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| {
            query
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("provider").as_deref(), Some("google"));
        assert_eq!(get("scopes").as_deref(), Some("email profile"));
        assert_eq!(
            get("redirect_to").as_deref(),
            Some("http://localhost:3000/auth/google/callback")
        );
        assert_eq!(
            get("code_challenge"),
            Some(pkce::generate_code_challenge(&request.code_verifier))
        );
    }

    #[tokio::test]
    async fn email_is_not_an_oauth_provider() {
        let identity = Arc::new(InMemoryIdentityProvider::new());
        let err = service(&identity)
            .authorization_url(AuthProvider::Email)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn callback_exchanges_code_bound_to_verifier() {
        let identity = Arc::new(InMemoryIdentityProvider::new());
        let svc = service(&identity);
        let request = svc.authorization_url(AuthProvider::Apple).await.unwrap();
        let challenge = pkce::generate_code_challenge(&request.code_verifier);
        let code = identity.issue_oauth_code("apple@example.com", AuthProvider::Apple, &challenge);

        let wrong = svc
            .handle_callback(AuthProvider::Apple, &code, "not-the-verifier")
            .await
            .unwrap_err();
        assert_eq!(
            wrong,
            AuthError::Unauthorized("Failed to authenticate with OAuth provider".into())
        );

        let code = identity.issue_oauth_code("apple@example.com", AuthProvider::Apple, &challenge);
        let response = svc
            .handle_callback(AuthProvider::Apple, &code, &request.code_verifier)
            .await
            .unwrap();
        assert_eq!(response.user.provider, AuthProvider::Apple);
        assert_eq!(response.user.email, "apple@example.com");
    }
}
