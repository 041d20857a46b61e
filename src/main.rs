mod config;
mod error;
mod security;
mod smtp;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::security::TlsConfig;
use crate::smtp::{ServerOptions, SmtpServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = if std::path::Path::new("config.toml").exists() {
        Config::from_file("config.toml")?
    } else {
        Config::default()
    };

    let level = config
        .logging
        .level
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .pretty()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting mx-rs");
    info!("  SMTP listening on: {}", config.smtp.listen_addr);
    info!("  Hostname: {}", config.server.hostname);
    info!("  STARTTLS enabled: {}", config.smtp.enable_starttls);

    let start_tls = if config.smtp.enable_starttls {
        let cert_path = config
            .smtp
            .tls_cert_path
            .as_deref()
            .ok_or("enable_starttls requires tls_cert_path")?;
        let key_path = config
            .smtp
            .tls_key_path
            .as_deref()
            .ok_or("enable_starttls requires tls_key_path")?;
        Some(TlsConfig::from_pem_files(cert_path, key_path)?)
    } else {
        None
    };

    // No delivery sink is wired up in the standalone binary; accepted
    // messages are discarded. Embedders set `handler`.
    let options = ServerOptions {
        hostname: config.server.hostname.clone(),
        start_tls,
        max_body_size: config.smtp.max_body_size,
        handler: None,
        ..ServerOptions::default()
    };

    let server = SmtpServer::new(options);
    server.run(&config.smtp.listen_addr).await?;

    Ok(())
}
