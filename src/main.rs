use pylontech_bridge::prelude::*;

#[tokio::main]
async fn main() {
    let options = Options::new();

    let config = ConfigWrapper::new(options.config_file.clone()).unwrap_or_else(|err| {
        eprintln!("Failed to load config {}: {:?}", options.config_file, err);
        std::process::exit(255);
    });

    pylontech_bridge::init_logging(config.loglevel());
    config.log_summary();

    if let Err(e) = pylontech_bridge::app(options, config).await {
        error!("{:#}", e);
        std::process::exit(255);
    }
}
