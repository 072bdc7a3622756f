use super::password::{hash_password, verify_password};
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use crate::pkce;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use nanoid::nanoid;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:9999";

struct Account {
    user: User,
    password_hash: Option<String>,
    confirmed: bool,
}

struct AccessGrant {
    user_id: UserId,
    expires_at: DateTime<Utc>,
}

struct OAuthGrant {
    email: String,
    provider: AuthProvider,
    code_challenge: String,
}

/// Self-contained identity backend for local development and tests.
///
/// Access tokens are opaque and expire after `access_ttl`. Refresh tokens are
/// single-use: a refresh consumes the presented token before issuing a new
/// pair, so of two concurrent refreshes with one token only one wins.
pub struct InMemoryIdentityProvider {
    base_url: Url,
    accounts: DashMap<UserId, Account>,
    emails: DashMap<String, UserId>,
    access_tokens: DashMap<String, AccessGrant>,
    refresh_tokens: DashMap<String, UserId>,
    otp_codes: DashMap<String, String>,
    oauth_codes: DashMap<String, OAuthGrant>,
    access_ttl: Duration,
    require_email_confirmation: bool,
    unavailable: AtomicBool,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("valid default URL"),
            accounts: DashMap::new(),
            emails: DashMap::new(),
            access_tokens: DashMap::new(),
            refresh_tokens: DashMap::new(),
            otp_codes: DashMap::new(),
            oauth_codes: DashMap::new(),
            access_ttl: Duration::hours(1),
            require_email_confirmation: false,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_access_ttl(mut self, access_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self
    }

    pub fn with_email_confirmation(mut self, required: bool) -> Self {
        self.require_email_confirmation = required;
        self
    }

    /// Simulates an outage: every call fails with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The code most recently mailed to `email`, if still unused.
    pub fn last_otp(&self, email: &str) -> Option<String> {
        self.otp_codes.get(&normalize(email)).map(|c| c.clone())
    }

    /// Mints an authorization code as if the OAuth provider had redirected
    /// back after the user consented.
    pub fn issue_oauth_code(&self, email: &str, provider: AuthProvider, code_challenge: &str) -> String {
        let code = nanoid!(24);
        self.oauth_codes.insert(
            code.clone(),
            OAuthGrant {
                email: normalize(email),
                provider,
                code_challenge: code_challenge.to_string(),
            },
        );
        code
    }

    /// Registers a confirmed account for `email` and installs the given token
    /// pair verbatim.
    pub fn seed_session(
        &self,
        email: &str,
        access_token: &str,
        refresh_token: &str,
        expires_in_seconds: u64,
    ) -> Session {
        let user = self.find_or_create(email, AuthProvider::Email);
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds as i64);
        self.access_tokens.insert(
            access_token.to_string(),
            AccessGrant {
                user_id: user.id,
                expires_at,
            },
        );
        self.refresh_tokens
            .insert(refresh_token.to_string(), user.id);
        Session {
            user,
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_in_seconds,
        }
    }

    /// Backdates an access token so the next introspection rejects it.
    pub fn expire_access_token(&self, access_token: &str) {
        if let Some(mut grant) = self.access_tokens.get_mut(access_token) {
            grant.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    pub fn is_refresh_token_live(&self, refresh_token: &str) -> bool {
        self.refresh_tokens.contains_key(refresh_token)
    }

    fn ensure_available(&self) -> Result<(), IdentityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn find_or_create(&self, email: &str, provider: AuthProvider) -> User {
        let email = normalize(email);
        if let Some(user) = self
            .emails
            .get(&email)
            .and_then(|id| self.accounts.get(&*id).map(|a| a.user.clone()))
        {
            return user;
        }
        let user = new_user(&email, provider, true);
        self.emails.insert(email, user.id);
        self.accounts.insert(
            user.id,
            Account {
                user: user.clone(),
                password_hash: None,
                confirmed: true,
            },
        );
        user
    }

    fn account_user(&self, user_id: UserId) -> Result<User, IdentityError> {
        self.accounts
            .get(&user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| unauthorized("User from sub claim in JWT does not exist"))
    }

    fn issue_session(&self, user: User) -> Session {
        let now = Utc::now();
        self.access_tokens.retain(|_, grant| grant.expires_at > now);

        let access_token = nanoid!(32);
        let refresh_token = nanoid!(32);
        self.access_tokens.insert(
            access_token.clone(),
            AccessGrant {
                user_id: user.id,
                expires_at: now + self.access_ttl,
            },
        );
        self.refresh_tokens.insert(refresh_token.clone(), user.id);
        Session {
            user,
            access_token,
            refresh_token,
            expires_in_seconds: self.access_ttl.num_seconds().max(0) as u64,
        }
    }

    fn user_for_access_token(&self, access_token: &str) -> Result<User, IdentityError> {
        let user_id = {
            let grant = self
                .access_tokens
                .get(access_token)
                .ok_or_else(|| unauthorized("invalid JWT: unable to parse or verify signature"))?;
            if grant.expires_at <= Utc::now() {
                return Err(unauthorized("invalid JWT: token is expired"));
            }
            grant.user_id
        };
        self.account_user(user_id)
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn unauthorized(message: &str) -> IdentityError {
    IdentityError::Rejected {
        status: Some(401),
        message: message.to_string(),
    }
}

fn bad_request(message: &str) -> IdentityError {
    IdentityError::Rejected {
        status: Some(400),
        message: message.to_string(),
    }
}

fn new_user(email: &str, provider: AuthProvider, verified: bool) -> User {
    let now = Utc::now();
    User {
        id: UserId(uuid::Uuid::new_v4()),
        email: email.to_string(),
        email_verified: verified,
        provider,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait::async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _redirect_to: &Url,
    ) -> Result<SignUpResult, IdentityError> {
        self.ensure_available()?;
        let email = normalize(email);
        let password_hash = hash_password(password)?;
        let confirmed = !self.require_email_confirmation;
        let user = new_user(&email, AuthProvider::Email, confirmed);

        match self.emails.entry(email) {
            Entry::Occupied(_) => return Err(IdentityError::AlreadyRegistered),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }
        self.accounts.insert(
            user.id,
            Account {
                user: user.clone(),
                password_hash: Some(password_hash),
                confirmed,
            },
        );
        debug!(user_id = %user.id, confirmed, "in-memory account created");

        let session = confirmed.then(|| self.issue_session(user.clone()));
        Ok(SignUpResult { user, session })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        self.ensure_available()?;
        let invalid = || bad_request("Invalid login credentials");

        let user_id = self.emails.get(&normalize(email)).map(|id| *id).ok_or_else(invalid)?;
        let (user, password_hash, confirmed) = {
            let account = self.accounts.get(&user_id).ok_or_else(invalid)?;
            (
                account.user.clone(),
                account.password_hash.clone(),
                account.confirmed,
            )
        };
        let password_hash = password_hash.ok_or_else(invalid)?;
        if !verify_password(password, &password_hash)? {
            return Err(invalid());
        }
        if !confirmed {
            return Err(bad_request("Email not confirmed"));
        }
        Ok(self.issue_session(user))
    }

    async fn sign_in_with_otp(
        &self,
        email: &str,
        _redirect_to: &Url,
    ) -> Result<(), IdentityError> {
        self.ensure_available()?;
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        self.otp_codes.insert(normalize(email), code);
        Ok(())
    }

    async fn verify_otp(&self, email: &str, code: &str) -> Result<Session, IdentityError> {
        self.ensure_available()?;
        let email = normalize(email);
        // A wrong guess leaves the outstanding code in place.
        let matched = self
            .otp_codes
            .remove_if(&email, |_, expected| expected == code)
            .is_some();
        if !matched {
            return Err(IdentityError::Rejected {
                status: Some(403),
                message: "Token has expired or is invalid".to_string(),
            });
        }

        let user = self.find_or_create(&email, AuthProvider::Email);
        if let Some(mut account) = self.accounts.get_mut(&user.id) {
            account.confirmed = true;
            account.user.email_verified = true;
        }
        let user = self.account_user(user.id)?;
        Ok(self.issue_session(user))
    }

    async fn get_user(&self, access_token: &str) -> Result<User, IdentityError> {
        self.ensure_available()?;
        self.user_for_access_token(access_token)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        self.ensure_available()?;
        let (_, user_id) = self
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| bad_request("Invalid Refresh Token: Refresh Token Not Found"))?;
        let user = self.account_user(user_id)?;
        Ok(self.issue_session(user))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.ensure_available()?;
        let (_, grant) = self
            .access_tokens
            .remove(access_token)
            .ok_or_else(|| unauthorized("invalid JWT: unable to parse or verify signature"))?;
        self.refresh_tokens.retain(|_, owner| *owner != grant.user_id);
        self.access_tokens.retain(|_, g| g.user_id != grant.user_id);
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        _redirect_to: &Url,
    ) -> Result<(), IdentityError> {
        self.ensure_available()?;
        // Unknown addresses succeed too, so callers cannot probe for accounts.
        debug!(known = self.emails.contains_key(&normalize(email)), "password recovery requested");
        Ok(())
    }

    async fn update_user_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.ensure_available()?;
        let user = self.user_for_access_token(access_token)?;
        let password_hash = hash_password(new_password)?;
        let mut account = self
            .accounts
            .get_mut(&user.id)
            .ok_or_else(|| unauthorized("User not found"))?;
        account.password_hash = Some(password_hash);
        account.user.updated_at = Utc::now();
        Ok(())
    }

    async fn oauth_authorization_url(&self, request: &OAuthRequest) -> Result<Url, IdentityError> {
        self.ensure_available()?;
        let mut url = self
            .base_url
            .join("auth/v1/authorize")
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
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
        self.ensure_available()?;
        let (_, grant) = self
            .oauth_codes
            .remove(code)
            .ok_or_else(|| bad_request("invalid flow state, no valid flow state found"))?;
        if pkce::generate_code_challenge(code_verifier) != grant.code_challenge {
            return Err(bad_request("code challenge does not match previously saved code verifier"));
        }
        let user = self.find_or_create(&grant.email, grant.provider);
        Ok(self.issue_session(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn redirect() -> Url {
        Url::parse("http://localhost:3000/auth/callback").unwrap()
    }

    #[tokio::test]
    async fn refresh_tokens_are_single_use() {
        let provider = InMemoryIdentityProvider::new();
        let seeded = provider.seed_session("a@example.com", "a1", "r1", 3600);

        let refreshed = provider.refresh_session("r1").await.unwrap();
        assert_eq!(refreshed.user.id, seeded.user.id);
        assert_ne!(refreshed.refresh_token, "r1");
        assert!(!provider.is_refresh_token_live("r1"));

        let again = provider.refresh_session("r1").await.unwrap_err();
        assert!(matches!(again, IdentityError::Rejected { .. }));
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() {
        let provider = Arc::new(InMemoryIdentityProvider::new());
        provider.seed_session("a@example.com", "a1", "shared", 3600);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.refresh_session("shared").await })
            })
            .collect();
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let provider = InMemoryIdentityProvider::new();
        provider.seed_session("a@example.com", "a1", "r1", 3600);
        assert!(provider.get_user("a1").await.is_ok());

        provider.expire_access_token("a1");

        let err = provider.get_user("a1").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn outage_is_transient() {
        let provider = InMemoryIdentityProvider::new();
        provider.seed_session("a@example.com", "a1", "r1", 3600);
        provider.set_unavailable(true);

        assert!(provider.get_user("a1").await.unwrap_err().is_transient());
        // The refresh token survives the outage.
        assert!(provider.refresh_session("r1").await.unwrap_err().is_transient());
        provider.set_unavailable(false);
        assert!(provider.refresh_session("r1").await.is_ok());
    }

    #[tokio::test]
    async fn unconfirmed_account_cannot_log_in() {
        let provider = InMemoryIdentityProvider::new().with_email_confirmation(true);
        let result = provider
            .sign_up("new@example.com", "ValidPass123", &redirect())
            .await
            .unwrap();
        assert!(result.session.is_none());
        assert!(!result.user.email_verified);

        let err = provider
            .sign_in_with_password("new@example.com", "ValidPass123")
            .await
            .unwrap_err();
        assert_eq!(err, bad_request("Email not confirmed"));
    }

    #[tokio::test]
    async fn emails_are_case_insensitive() {
        let provider = InMemoryIdentityProvider::new();
        provider
            .sign_up("Mixed@Example.com", "ValidPass123", &redirect())
            .await
            .unwrap();

        let err = provider
            .sign_up("mixed@example.com", "ValidPass123", &redirect())
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::AlreadyRegistered);
        assert!(
            provider
                .sign_in_with_password("MIXED@example.com", "ValidPass123")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn issuing_a_session_evicts_expired_grants() {
        let provider = InMemoryIdentityProvider::new();
        provider.seed_session("a@example.com", "stale", "r1", 3600);
        provider.seed_session("b@example.com", "live", "r2", 3600);
        provider.expire_access_token("stale");

        provider.refresh_session("r2").await.unwrap();

        assert!(!provider.access_tokens.contains_key("stale"));
        assert!(provider.get_user("live").await.is_ok());
        assert_eq!(provider.access_tokens.len(), 2);
    }

    #[tokio::test]
    async fn sign_out_revokes_every_token_of_the_user() {
        let provider = InMemoryIdentityProvider::new();
        provider.seed_session("a@example.com", "a1", "r1", 3600);

        provider.sign_out("a1").await.unwrap();

        assert!(provider.get_user("a1").await.is_err());
        assert!(!provider.is_refresh_token_live("r1"));
    }
}
