use authgate::logger::*;
use authgate::settings::LogFormat;

// $ cargo run --bin logger_demo -- json
fn main() -> anyhow::Result<()> {
    let format = match std::env::args().nth(1).as_deref() {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Text,
    };
    let logger = Logger::new_bootstrap(format);
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!("bootstrap info log");

    let config = LogConfig {
        filter: "debug".to_string(),
    };
    logger.reload_from_config(&config)?;
    trace!("application trace log");
    debug!(email = "demo@example.com", "application debug log");
    info!(provider = "google", "application info log");

    let is_err = logger
        .reload_from_config(&LogConfig {
            filter: "[[not a filter".to_string(),
        })
        .is_err();
    println!("Error on invalid filter: {:?}", is_err);

    Ok(())
}
