use authgate::settings::*;

fn main() {
    // Load settings from the default location
    let project_settings = parse_settings(None).unwrap();
    println!("Loaded settings: {:?}", project_settings);
    println!("TLS: {:?}", project_settings.http.tls_paths());

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    // Attempt to load from a custom path, with env overrides
    // $ AUTHGATE__LOG__FILTER=debug cargo run --bin settings_demo -- --settings=settings/release.toml
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref()).unwrap();
    println!("Loaded settings: {:?}", project_settings);
}
