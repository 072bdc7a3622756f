use anyhow::{Result, anyhow};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub identity: Identity,
    pub http: Http,
    pub log: Log,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default)]
    pub environment: Environment,
    pub frontend_url: String,
}

impl App {
    /// Session cookies carry `Secure` only in production.
    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[derive(Deserialize)]
pub struct Identity {
    pub backend: String, // "memory" or "supabase"
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub service_role_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("Identity")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("anon_key", &redact(&self.anon_key))
            .field("service_role_key", &redact(&self.service_role_key))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

impl Http {
    /// Returns the cert/key pair when TLS is configured. Setting only one of
    /// them is an error.
    pub fn tls_paths(&self) -> Result<Option<(&str, &str)>> {
        match (self.cert_path.as_deref(), self.key_path.as_deref()) {
            (Some(cert), Some(key)) => Ok(Some((cert, key))),
            (None, None) => Ok(None),
            _ => Err(anyhow!("http.cert_path and http.key_path must be set together")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const ENV_PREFIX: &str = "AUTHGATE";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);
    from_builder(Config::builder().add_source(File::with_name(path)))
}

/// Environment variables such as `AUTHGATE__IDENTITY__ANON_KEY` override
/// values from the file.
fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    let settings: Settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
