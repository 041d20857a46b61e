//! mx-rs: inbound SMTP receiver
//!
//! A small ESMTP server core (RFC 5321 subset) that accepts connections,
//! drives each one through a per-connection session state machine, and
//! hands accepted messages to a pluggable delivery sink.
//!
//! # Features
//!
//! - **ESMTP session**: HELO/EHLO, MAIL, RCPT, DATA, RSET, NOOP, QUIT,
//!   with PIPELINING and 8BITMIME advertised
//! - **STARTTLS**: opportunistic in-band TLS upgrade (RFC 3207) with the
//!   mandated state reset
//! - **Byte cap**: a streaming cumulative limit on session data, 56 MiB
//!   by default
//! - **Delivery sink**: accepted envelopes leave through one async trait
//!   method; everything past that point is the host's concern
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mx_rs::smtp::{listen, Envelope, MessageHandler, ServerOptions};
//!
//! struct PrintHandler;
//!
//! #[async_trait::async_trait]
//! impl MessageHandler for PrintHandler {
//!     async fn handle(&self, envelope: Envelope) -> mx_rs::Result<()> {
//!         println!(
//!             "mail from {} for {} recipient(s)",
//!             envelope.source,
//!             envelope.destinations.len()
//!         );
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> mx_rs::Result<()> {
//!     let options = ServerOptions {
//!         hostname: "mx.example.org".to_string(),
//!         handler: Some(Arc::new(PrintHandler)),
//!         ..ServerOptions::default()
//!     };
//!
//!     let handle = listen("127.0.0.1:2525", options).await?;
//!     handle.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: TOML file configuration for the binary
//! - [`error`]: error types and the crate `Result`
//! - [`security`]: certificate loading for STARTTLS
//! - [`smtp`]: the protocol core (reader, parser, encoder, session,
//!   listener, delivery)

pub mod config;
pub mod error;
pub mod security;
pub mod smtp;

pub use config::Config;
pub use error::{Result, SmtpError};
pub use smtp::{listen, Envelope, MessageHandler, ServerHandle, ServerOptions, SmtpServer};
