//! GoTrue JSON shapes.

use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub(super) struct AppMetadata {
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UserBody {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<UserBody> for User {
    fn from(body: UserBody) -> Self {
        let now = Utc::now();
        User {
            id: body.id,
            email: body.email.unwrap_or_default(),
            email_verified: body.email_confirmed_at.is_some(),
            provider: body
                .app_metadata
                .provider
                .and_then(|p| p.parse().ok())
                .unwrap_or_default(),
            created_at: body.created_at.unwrap_or(now),
            updated_at: body.updated_at.unwrap_or(now),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SessionBody {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: UserBody,
}

impl From<SessionBody> for Session {
    fn from(body: SessionBody) -> Self {
        Session {
            user: body.user.into(),
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in_seconds: body.expires_in,
        }
    }
}

/// Signup answers with a session when confirmation is off and with the bare
/// user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum SignUpBody {
    Session(SessionBody),
    User(UserBody),
}

/// GoTrue has used several error layouts over time.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        self.msg
            .as_ref()
            .or(self.message.as_ref())
            .or(self.error_description.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_else(|| "unknown error".to_string())
    }

    pub fn is_already_registered(&self) -> bool {
        self.error_code.as_deref() == Some("user_already_exists")
            || self.message().to_lowercase().contains("already registered")
    }
}
