use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty command line")]
    EmptyCommand,

    #[error("unrecognised command: {0}")]
    UnknownCommand(String),

    #[error("session byte limit exceeded")]
    TooMuchData,

    #[error("connection idle for too long")]
    IdleTimeout,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, SmtpError>;
