use super::cookies::*;
use super::error::*;
use crate::application_port::*;
use crate::domain_model::{AuthProvider, CredentialBundle, User, ValidationOutcome};
use crate::logger::*;
use chrono::{DateTime, Utc};
use cookie::Cookie;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::header::{HeaderValue, SET_COOKIE};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Reply, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

/// Most failures carry a coded error; token validation answers with a bare
/// message string.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiErrorBody {
    Detailed(ApiError),
    Message(String),
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn err(error: ApiError) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: None,
            error: Some(ApiErrorBody::Detailed(error)),
        }
    }

    pub fn err_message(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: None,
            error: Some(ApiErrorBody::Message(message.into())),
        }
    }
}

/// Serializes `body` and appends one `Set-Cookie` header per cookie.
fn respond<T: Serialize>(
    status: StatusCode,
    body: &ApiResponse<T>,
    cookies: Vec<Cookie<'static>>,
) -> Response {
    let mut response = warp::reply::with_status(warp::reply::json(body), status).into_response();
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!(cookie = cookie.name(), "unrenderable cookie: {}", e),
        }
    }
    response
}

/// Caller identity established by a bearer token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageData {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub fn health() -> impl Reply {
    warp::reply::json(&HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

pub async fn signup(
    body: CredentialsRequest,
    auth_service: Arc<dyn AuthService>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    let signup_input = SignupInput {
        email: body.email,
        password: body.password,
    };
    let response = auth_service
        .signup(signup_input)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    let cookies = session_cookies(&response, policy);
    Ok(respond(
        StatusCode::CREATED,
        &ApiResponse::ok(response),
        cookies,
    ))
}

pub async fn login(
    body: CredentialsRequest,
    auth_service: Arc<dyn AuthService>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    let login_input = LoginInput {
        email: body.email,
        password: body.password,
    };
    let response = auth_service
        .login(login_input)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    Ok(session_response(
        response,
        policy,
        Some("Login successful, tokens set in cookies"),
    ))
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

pub async fn login_with_otp(
    body: EmailRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<Response, warp::Rejection> {
    auth_service
        .login_with_otp(&body.email)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    let data = MessageData {
        message: "OTP sent to email",
    };
    Ok(respond(StatusCode::OK, &ApiResponse::ok(data), Vec::new()))
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub token: String,
}

pub async fn verify_otp(
    body: VerifyOtpRequest,
    auth_service: Arc<dyn AuthService>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    let response = auth_service
        .verify_otp(&body.email, &body.token)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    Ok(session_response(response, policy, None))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// The body is optional here, so it is parsed by hand instead of through
/// `warp::body::json`.
pub async fn refresh(
    refresh_cookie: Option<String>,
    body: Bytes,
    auth_service: Arc<dyn AuthService>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        RefreshRequest::default()
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| reject::custom(ApiError::validation(format!("Invalid request body: {e}"))))?
    };
    let refresh_token = refresh_cookie
        .into_iter()
        .chain(from_body.refresh_token)
        .find(|token| !token.trim().is_empty());

    let Some(refresh_token) = refresh_token else {
        return Ok(respond(
            StatusCode::UNAUTHORIZED,
            &ApiResponse::<()>::err_message("No refresh token provided"),
            Vec::new(),
        ));
    };

    match auth_service.refresh_token(&refresh_token).await {
        Ok(response) => Ok(session_response(response, policy, None)),
        Err(AuthError::Unauthorized(message)) => Ok(respond(
            StatusCode::UNAUTHORIZED,
            &ApiResponse::<()>::err(ApiError::unauthorized(message)),
            CookieAction::ClearPair.into_cookies(policy),
        )),
        Err(e) => Err(reject::custom(ApiError::from(e))),
    }
}

pub async fn forgot_password(
    body: EmailRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<Response, warp::Rejection> {
    auth_service
        .request_password_reset(&body.email)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    let data = MessageData {
        message: "Password reset email sent",
    };
    Ok(respond(StatusCode::OK, &ApiResponse::ok(data), Vec::new()))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

pub async fn reset_password(
    caller: Authenticated,
    body: ResetPasswordRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<Response, warp::Rejection> {
    auth_service
        .reset_password(&caller.access_token, &body.password)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    info!(user_id = %caller.user.id, "password reset");
    let data = MessageData {
        message: "Password reset successfully",
    };
    Ok(respond(StatusCode::OK, &ApiResponse::ok(data), Vec::new()))
}

fn parse_provider(provider: &str) -> Result<AuthProvider, warp::Rejection> {
    provider
        .parse::<AuthProvider>()
        .map_err(|e| reject::custom(ApiError::validation(e.to_string())))
}

#[derive(Debug, Serialize)]
pub struct OAuthUrlResponse {
    pub url: String,
}

pub async fn oauth_url(
    provider: String,
    oauth_service: Arc<dyn OAuthService>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    let provider = parse_provider(&provider)?;
    let request = oauth_service
        .authorization_url(provider)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    let cookies = vec![pkce_cookie(request.code_verifier, policy)];
    Ok(respond(
        StatusCode::OK,
        &ApiResponse::ok(OAuthUrlResponse { url: request.url }),
        cookies,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCallbackRequest {
    pub code: String,
    /// For clients that cannot carry the verifier cookie.
    #[serde(default)]
    pub code_verifier: Option<String>,
}

pub async fn oauth_callback(
    provider: String,
    body: OAuthCallbackRequest,
    verifier_cookie: Option<String>,
    oauth_service: Arc<dyn OAuthService>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    let provider = parse_provider(&provider)?;
    let code_verifier = verifier_cookie
        .into_iter()
        .chain(body.code_verifier)
        .find(|v| !v.trim().is_empty())
        .ok_or_else(|| reject::custom(ApiError::validation("Missing PKCE code verifier")))?;

    let response = oauth_service
        .handle_callback(provider, &body.code, &code_verifier)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    let mut cookies = session_cookies(&response, policy);
    cookies.push(clear_pkce_cookie(policy));
    Ok(respond(StatusCode::OK, &ApiResponse::ok(response), cookies))
}

pub async fn logout(
    caller: Authenticated,
    auth_service: Arc<dyn AuthService>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    auth_service
        .logout(&caller.access_token)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    info!(user_id = %caller.user.id, "logged out");
    let data = MessageData {
        message: "Logged out successfully",
    };
    Ok(respond(
        StatusCode::OK,
        &ApiResponse::ok(data),
        CookieAction::ClearPair.into_cookies(policy),
    ))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
}

pub async fn me(caller: Authenticated) -> Result<Response, warp::Rejection> {
    Ok(respond(
        StatusCode::OK,
        &ApiResponse::ok(MeResponse { user: caller.user }),
        Vec::new(),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    pub token_refreshed: bool,
    pub user: User,
}

pub async fn validate_token(
    credentials: CredentialBundle,
    token_reconciler: Arc<dyn TokenReconciler>,
    policy: CookiePolicy,
) -> Result<Response, warp::Rejection> {
    let outcome = token_reconciler
        .validate(credentials)
        .await
        .map_err(ApiError::from)
        .map_err(reject::custom)?;

    let cookies = CookieAction::for_outcome(&outcome).into_cookies(policy);
    let response = match outcome {
        ValidationOutcome::Valid(user) => {
            let data = ValidateTokenResponse {
                valid: Some(true),
                token_refreshed: false,
                user,
            };
            respond(StatusCode::OK, &ApiResponse::ok(data), cookies)
        }
        ValidationOutcome::Refreshed(session) => {
            let data = ValidateTokenResponse {
                valid: None,
                token_refreshed: true,
                user: session.user,
            };
            respond(StatusCode::OK, &ApiResponse::ok(data), cookies)
        }
        ValidationOutcome::Invalid(reason) => {
            debug!(%reason, "token validation rejected");
            respond(
                StatusCode::UNAUTHORIZED,
                &ApiResponse::<()>::err_message(reason.message()),
                cookies,
            )
        }
    };
    Ok(response)
}

fn session_response(
    response: AuthResponse,
    policy: CookiePolicy,
    message: Option<&str>,
) -> Response {
    let cookies = session_cookies(&response, policy);
    let mut body = ApiResponse::ok(response);
    if let Some(message) = message {
        body = body.with_message(message);
    }
    respond(StatusCode::OK, &body, cookies)
}

fn session_cookies(response: &AuthResponse, policy: CookiePolicy) -> Vec<Cookie<'static>> {
    match &response.tokens {
        Some(tokens) => CookieAction::for_tokens(tokens).into_cookies(policy),
        None => Vec::new(),
    }
}
