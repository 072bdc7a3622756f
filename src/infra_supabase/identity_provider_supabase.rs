use super::wire::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: Url,
    pub anon_key: String,
    /// Used for admin sign-out; falls back to the anon key.
    pub service_role_key: Option<String>,
    pub timeout: Duration,
}

/// Identity provider backed by a Supabase (GoTrue) auth server.
pub struct SupabaseIdentityProvider {
    cfg: SupabaseConfig,
    http: reqwest::Client,
}

impl SupabaseIdentityProvider {
    pub fn new(cfg: SupabaseConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        Ok(Self { cfg, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        let base = self.cfg.url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/auth/v1/{path}"))
            .map_err(|e| IdentityError::Unavailable(format!("bad endpoint {path}: {e}")))
    }

    /// Request carrying the project key. User-scoped calls pass the user's
    /// access token as the bearer instead of the key.
    fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let bearer = bearer.unwrap_or(self.cfg.anon_key.as_str());
        self.http
            .request(method, url)
            .header("apikey", &self.cfg.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(request: RequestBuilder, operation: &'static str) -> Result<Response, IdentityError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                IdentityError::Timeout
            } else {
                warn!(operation, error = %e, "identity request failed");
                IdentityError::Unavailable(e.to_string())
            }
        })?;
        Self::ensure_success(response, operation).await
    }

    async fn ensure_success(
        response: Response,
        operation: &'static str,
    ) -> Result<Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: ErrorBody = response.json().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(operation, status = status.as_u16(), message = %body.message(), "identity backend error");
            return Err(IdentityError::Unavailable(format!(
                "{operation}: {status} {}",
                body.message()
            )));
        }
        if body.is_already_registered() {
            return Err(IdentityError::AlreadyRegistered);
        }
        Err(IdentityError::Rejected {
            status: Some(status.as_u16()),
            message: body.message(),
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, IdentityError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                IdentityError::Timeout
            } else {
                IdentityError::Unavailable(format!("malformed response: {e}"))
            }
        })
    }

    async fn token_grant<B: Serialize + ?Sized>(
        &self,
        grant_type: &str,
        body: &B,
        operation: &'static str,
    ) -> Result<Session, IdentityError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let response = Self::send(self.request(Method::POST, url, None).json(body), operation).await?;
        Ok(Self::json::<SessionBody>(response).await?.into())
    }
}

fn with_redirect(mut url: Url, redirect_to: &Url) -> Url {
    url.query_pairs_mut()
        .append_pair("redirect_to", redirect_to.as_str());
    url
}

#[async_trait::async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &Url,
    ) -> Result<SignUpResult, IdentityError> {
        let url = with_redirect(self.endpoint("signup")?, redirect_to);
        let request = self
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "password": password }));
        let response = Self::send(request, "signup").await?;
        Ok(match Self::json::<SignUpBody>(response).await? {
            SignUpBody::Session(session) => {
                let session: Session = session.into();
                SignUpResult {
                    user: session.user.clone(),
                    session: Some(session),
                }
            }
            SignUpBody::User(user) => SignUpResult {
                user: user.into(),
                session: None,
            },
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        self.token_grant(
            "password",
            &json!({ "email": email, "password": password }),
            "password grant",
        )
        .await
    }

    async fn sign_in_with_otp(&self, email: &str, redirect_to: &Url) -> Result<(), IdentityError> {
        let url = with_redirect(self.endpoint("otp")?, redirect_to);
        let request = self
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "create_user": true }));
        Self::send(request, "otp").await?;
        Ok(())
    }

    async fn verify_otp(&self, email: &str, code: &str) -> Result<Session, IdentityError> {
        let request = self
            .request(Method::POST, self.endpoint("verify")?, None)
            .json(&json!({ "type": "email", "email": email, "token": code }));
        let response = Self::send(request, "verify").await?;
        Ok(Self::json::<SessionBody>(response).await?.into())
    }

    async fn get_user(&self, access_token: &str) -> Result<User, IdentityError> {
        let request = self.request(Method::GET, self.endpoint("user")?, Some(access_token));
        let response = Self::send(request, "get user").await?;
        Ok(Self::json::<UserBody>(response).await?.into())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        self.token_grant(
            "refresh_token",
            &json!({ "refresh_token": refresh_token }),
            "refresh grant",
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let mut url = self.endpoint("logout")?;
        url.query_pairs_mut().append_pair("scope", "global");
        let key = self
            .cfg
            .service_role_key
            .as_deref()
            .unwrap_or(self.cfg.anon_key.as_str());
        let request = self
            .http
            .post(url)
            .header("apikey", key)
            .bearer_auth(access_token);
        Self::send(request, "logout").await?;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &Url,
    ) -> Result<(), IdentityError> {
        let url = with_redirect(self.endpoint("recover")?, redirect_to);
        let request = self
            .request(Method::POST, url, None)
            .json(&json!({ "email": email }));
        Self::send(request, "recover").await?;
        Ok(())
    }

    async fn update_user_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let request = self
            .request(Method::PUT, self.endpoint("user")?, Some(access_token))
            .json(&json!({ "password": new_password }));
        Self::send(request, "update user").await?;
        Ok(())
    }

    async fn oauth_authorization_url(&self, request: &OAuthRequest) -> Result<Url, IdentityError> {
        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", request.provider.as_str())
            .append_pair("redirect_to", request.redirect_to.as_str())
            .append_pair("scopes", &request.scopes)
            .append_pair("code_challenge", &request.code_challenge)
            .append_pair("code_challenge_method", "s256");
        Ok(url)
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<Session, IdentityError> {
        self.token_grant(
            "pkce",
            &json!({ "auth_code": code, "code_verifier": code_verifier }),
            "pkce grant",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const USER_ID: &str = "6f1c1c55-1f39-4a4c-9d5b-2c1f5e5b9a01";

    fn provider(server: &MockServer) -> SupabaseIdentityProvider {
        SupabaseIdentityProvider::new(SupabaseConfig {
            url: Url::parse(&server.uri()).unwrap(),
            anon_key: "anon-key".into(),
            service_role_key: Some("service-key".into()),
            timeout: Duration::from_millis(500),
        })
        .unwrap()
    }

    fn user_json() -> serde_json::Value {
        json!({
            "id": USER_ID,
            "aud": "authenticated",
            "email": "test@example.com",
            "email_confirmed_at": "2024-01-01T00:00:00Z",
            "app_metadata": { "provider": "email" },
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        })
    }

    fn session_json(access: &str, refresh: &str) -> serde_json::Value {
        json!({
            "access_token": access,
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "refresh_token": refresh,
            "user": user_json()
        })
    }

    fn redirect() -> Url {
        Url::parse("http://localhost:3000/auth/callback").unwrap()
    }

    #[tokio::test]
    async fn password_grant_maps_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon-key"))
            .and(body_json(json!({ "email": "test@example.com", "password": "ValidPass123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("a1", "r1")))
            .mount(&server)
            .await;

        let session = provider(&server)
            .sign_in_with_password("test@example.com", "ValidPass123")
            .await
            .unwrap();

        assert_eq!(session.access_token, "a1");
        assert_eq!(session.refresh_token, "r1");
        assert_eq!(session.expires_in_seconds, 3600);
        assert_eq!(session.user.id.to_string(), USER_ID);
        assert!(session.user.email_verified);
        assert_eq!(session.user.provider, AuthProvider::Email);
    }

    #[tokio::test]
    async fn bad_credentials_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .sign_in_with_password("test@example.com", "WrongPassword123")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            IdentityError::Rejected {
                status: Some(400),
                message: "Invalid login credentials".into()
            }
        );
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server).refresh_session("r1").await.unwrap_err();

        assert!(matches!(err, IdentityError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(user_json())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = provider(&server).get_user("a1").await.unwrap_err();

        assert_eq!(err, IdentityError::Timeout);
    }

    #[tokio::test]
    async fn get_user_sends_user_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&server)
            .await;

        let user = provider(&server).get_user("user-token").await.unwrap();

        assert_eq!(user.email, "test@example.com");
    }

    #[tokio::test]
    async fn signup_without_session_when_confirmation_required() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(query_param("redirect_to", "http://localhost:3000/auth/callback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&server)
            .await;

        let result = provider(&server)
            .sign_up("test@example.com", "ValidPass123", &redirect())
            .await
            .unwrap();

        assert!(result.session.is_none());
        assert_eq!(result.user.id.to_string(), USER_ID);
    }

    #[tokio::test]
    async fn signup_duplicate_is_already_registered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "error_code": "user_already_exists",
                "msg": "User already registered"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .sign_up("test@example.com", "ValidPass123", &redirect())
            .await
            .unwrap_err();

        assert_eq!(err, IdentityError::AlreadyRegistered);
    }

    #[tokio::test]
    async fn logout_uses_service_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(query_param("scope", "global"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server).sign_out("a1").await.unwrap();
    }

    #[tokio::test]
    async fn pkce_exchange_posts_code_and_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "pkce"))
            .and(body_json(json!({ "auth_code": "code-1", "code_verifier": "verifier-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("a2", "r2")))
            .mount(&server)
            .await;

        let session = provider(&server)
            .exchange_code_for_session("code-1", "verifier-1")
            .await
            .unwrap();

        assert_eq!(session.access_token, "a2");
    }

    #[tokio::test]
    async fn authorize_url_is_built_locally() {
        let server = MockServer::start().await;
        let request = OAuthRequest {
            provider: AuthProvider::Google,
            redirect_to: Url::parse("http://localhost:3000/auth/google/callback").unwrap(),
            scopes: "email profile".into(),
            code_challenge: "challenge".into(),
        };

        let url = provider(&server).oauth_authorization_url(&request).await.unwrap();

        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".into(), "google".into())));
        assert!(pairs.contains(&("scopes".into(), "email profile".into())));
        assert!(pairs.contains(&("code_challenge_method".into(), "s256".into())));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
