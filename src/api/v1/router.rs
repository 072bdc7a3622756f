use super::cookies::*;
use super::error::*;
use super::handler::{self, Authenticated};
use crate::application_port::AuthService;
use crate::domain_model::CredentialBundle;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

/// Routes mounted under `/api/v1/auth`.
pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let policy = CookiePolicy {
        secure: server.secure_cookies,
    };

    // Paths are matched before methods so an unknown path is a 404, not a 405.
    let signup = warp::path("signup")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with_policy(policy))
        .and_then(handler::signup);

    let login = warp::path("login")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with_policy(policy))
        .and_then(handler::login);

    let login_otp = warp::path("login")
        .and(warp::path("otp"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::login_with_otp);

    let verify_otp = warp::path("verify-otp")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with_policy(policy))
        .and_then(handler::verify_otp);

    let refresh = warp::path("refresh")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .and(warp::body::bytes())
        .and(with(server.auth_service.clone()))
        .and(with_policy(policy))
        .and_then(handler::refresh);

    let forgot_password = warp::path("forgot-password")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::forgot_password);

    let reset_password = warp::path("reset-password")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_verification(server.auth_service.clone()))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::reset_password);

    let oauth_url = warp::path("oauth")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with(server.oauth_service.clone()))
        .and(with_policy(policy))
        .and_then(handler::oauth_url);

    let oauth_callback = warp::path("oauth")
        .and(warp::path::param::<String>())
        .and(warp::path("callback"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(warp::cookie::optional::<String>(PKCE_COOKIE))
        .and(with(server.oauth_service.clone()))
        .and(with_policy(policy))
        .and_then(handler::oauth_callback);

    let logout = warp::path("logout")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and(with_policy(policy))
        .and_then(handler::logout);

    let me = warp::path("me")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_verification(server.auth_service.clone()))
        .and_then(handler::me);

    let validate_token = warp::path("validate-token")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_credentials())
        .and(with(server.token_reconciler.clone()))
        .and(with_policy(policy))
        .and_then(handler::validate_token);

    let session = signup
        .or(login)
        .or(login_otp)
        .or(verify_otp)
        .or(refresh)
        .or(logout);
    let password = forgot_password.or(reset_password);
    let oauth = oauth_url.or(oauth_callback);

    session.or(password).or(oauth).or(me).or(validate_token)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_policy(policy: CookiePolicy) -> impl Filter<Extract = (CookiePolicy,), Error = Infallible> + Clone {
    warp::any().map(move || policy)
}

/// The auth scheme is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim_start().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The `Authorization` header as text. A value that is not visible ASCII
/// counts as absent.
fn authorization_header() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::header::headers_cloned().map(|headers: http::HeaderMap| {
        headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

/// Requires a bearer token that the identity provider accepts as is. Never
/// refreshes; clients with stale credentials go through `/validate-token`.
fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (Authenticated,), Error = warp::Rejection> + Clone {
    authorization_header().and_then(
        move |header: Option<String>| {
            let auth_service = auth_service.clone();
            async move {
                let Some(token) = header.as_deref().and_then(bearer_token) else {
                    return Err(reject::custom(ApiError::unauthorized(
                        "Missing or invalid authorization header",
                    )));
                };
                let user = auth_service
                    .verify_token(token)
                    .await
                    .map_err(ApiError::from)
                    .map_err(reject::custom)?;
                Ok::<_, warp::Rejection>(Authenticated {
                    user,
                    access_token: token.to_string(),
                })
            }
        },
    )
}

/// Collects every candidate token on the request: bearer header, then the
/// session cookies.
fn with_credentials() -> impl Filter<Extract = (CredentialBundle,), Error = Infallible> + Clone
{
    authorization_header()
        .and(warp::cookie::optional::<String>(ACCESS_COOKIE))
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .map(
            |header: Option<String>, access: Option<String>, refresh: Option<String>| {
                CredentialBundle::from_request_parts(
                    header.as_deref().and_then(bearer_token),
                    access.as_deref(),
                    refresh.as_deref(),
                )
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER  abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer  "), None);
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[tokio::test]
    async fn credentials_prefer_bearer_over_cookie() {
        let bundle = warp::test::request()
            .header("authorization", "Bearer from-header")
            .header("cookie", "accessToken=from-cookie; refreshToken=r")
            .filter(&with_credentials())
            .await
            .unwrap();
        assert_eq!(bundle.access_token.as_deref(), Some("from-header"));
        assert_eq!(bundle.refresh_token.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn credentials_from_cookies_only() {
        let bundle = warp::test::request()
            .header("cookie", "accessToken=a; refreshToken=r")
            .filter(&with_credentials())
            .await
            .unwrap();
        assert_eq!(bundle.access_token.as_deref(), Some("a"));
        assert_eq!(bundle.refresh_token.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn undecodable_authorization_falls_back_to_cookies() {
        let bundle = warp::test::request()
            .header("authorization", &b"Bearer \xfftoken"[..])
            .header("cookie", "accessToken=a")
            .filter(&with_credentials())
            .await
            .unwrap();
        assert_eq!(bundle.access_token.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn no_credentials_is_an_empty_bundle() {
        let bundle = warp::test::request()
            .filter(&with_credentials())
            .await
            .unwrap();
        assert!(bundle.is_empty());
    }
}
