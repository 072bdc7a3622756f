use authgate::api;
use authgate::logger::*;
use authgate::server::*;
use authgate::settings::*;
use std::fs;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    let logger = Logger::new_bootstrap(project_settings.log.format);
    info!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let address: std::net::SocketAddr = project_settings.http.address.parse()?;
    let tls = project_settings.http.tls_paths()?;
    if let Some((cert_path, key_path)) = tls {
        if !fs::metadata(cert_path)?.is_file() {
            return Err(anyhow::anyhow!("TLS cert is not a regular file: {:?}", cert_path));
        }
        if !fs::metadata(key_path)?.is_file() {
            return Err(anyhow::anyhow!("TLS key is not a regular file: {:?}", key_path));
        }
    }

    let server = Arc::new(Server::try_new(&project_settings)?);
    let routes = api::routes(server);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("could not register SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    };

    match tls {
        Some((cert_path, key_path)) => {
            let (bound, serving) = warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(address, shutdown);
            info!(%bound, "listening with TLS");
            serving.await;
        }
        None => {
            let (bound, serving) = warp::serve(routes).bind_with_graceful_shutdown(address, shutdown);
            info!(%bound, "listening");
            serving.await;
        }
    }

    info!("server stopped");
    Ok(())
}
