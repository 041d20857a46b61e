use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SmtpError};
use crate::smtp::server::DEFAULT_MAX_BODY_SIZE;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub listen_addr: String,
    pub enable_starttls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SmtpError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| SmtpError::Config(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                hostname: "localhost".to_string(),
            },
            smtp: SmtpConfig {
                listen_addr: "0.0.0.0:2525".to_string(),
                enable_starttls: false,
                tls_cert_path: None,
                tls_key_path: None,
                max_body_size: DEFAULT_MAX_BODY_SIZE,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
