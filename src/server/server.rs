use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_supabase::*;
use crate::logger::*;
use crate::settings::{Environment, Settings};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub oauth_service: Arc<dyn OAuthService>,
    pub token_reconciler: Arc<dyn TokenReconciler>,
    pub secure_cookies: bool,
    /// Origin of the frontend, the only one allowed to make credentialed
    /// cross-origin calls.
    pub allowed_origin: String,
}

impl Server {
    pub fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let frontend_url = Url::parse(&settings.app.frontend_url)?;
        let call_timeout = Duration::from_millis(settings.identity.timeout_ms);

        let identity: Arc<dyn IdentityProvider> = match settings.identity.backend.as_str() {
            "memory" => {
                if settings.app.environment == Environment::Production {
                    warn!("in-memory identity backend configured in production");
                }
                Arc::new(InMemoryIdentityProvider::new())
            }
            "supabase" => {
                let url = settings
                    .identity
                    .url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("identity.url is required for supabase"))?;
                let anon_key = settings.identity.anon_key.clone().ok_or_else(|| {
                    anyhow::anyhow!("identity.anon_key is required for supabase")
                })?;
                let provider = SupabaseIdentityProvider::new(SupabaseConfig {
                    url: Url::parse(url)?,
                    anon_key,
                    service_role_key: settings.identity.service_role_key.clone(),
                    timeout: call_timeout,
                })?;
                Arc::new(provider)
            }
            other => return Err(anyhow::anyhow!("Unknown identity backend: {}", other)),
        };
        info!(backend = %settings.identity.backend, "identity provider ready");

        let server = Self::new(
            identity,
            &frontend_url,
            settings.app.secure_cookies(),
            call_timeout,
        )?;
        info!("server started");
        Ok(server)
    }

    /// Wires the services around an already built identity provider.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        frontend_url: &Url,
        secure_cookies: bool,
        call_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let origin = frontend_url.origin();
        if !origin.is_tuple() {
            return Err(anyhow::anyhow!(
                "frontend url has no usable origin: {}",
                frontend_url
            ));
        }
        let allowed_origin = origin.ascii_serialization();

        let auth_service: Arc<dyn AuthService> = Arc::new(
            RealAuthService::new(identity.clone(), frontend_url)?.with_call_timeout(call_timeout),
        );
        let oauth_service: Arc<dyn OAuthService> = Arc::new(
            RealOAuthService::new(identity.clone(), frontend_url.clone())
                .with_call_timeout(call_timeout),
        );
        let token_reconciler: Arc<dyn TokenReconciler> =
            Arc::new(RealTokenReconciler::new(identity).with_call_timeout(call_timeout));

        Ok(Self {
            auth_service,
            oauth_service,
            token_reconciler,
            secure_cookies,
            allowed_origin,
        })
    }
}
