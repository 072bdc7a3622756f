use crate::settings::LogFormat;
use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

pub struct LogConfig {
    pub filter: String,
}

pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    /// Installs the global subscriber at `info`. The output format is fixed
    /// for the life of the process; only the filter can be reloaded.
    pub fn new_bootstrap(format: LogFormat) -> Self {
        let filter = EnvFilter::new("info");
        let (filter, reload_handle) = reload::Layer::new(filter);

        let registry = tracing_subscriber::registry().with(filter);
        match format {
            LogFormat::Text => registry.with(fmt::layer()).init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_current_span(false))
                .init(),
        }

        Self { reload_handle }
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = EnvFilter::try_new(&config.filter).map_err(|e| anyhow!(e))?;
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
