//! Per-connection ESMTP session
//!
//! The session drives one accepted connection through the command loop:
//! greeting, HELO/EHLO, the MAIL/RCPT/DATA transaction, STARTTLS upgrade,
//! and orderly or error-driven teardown. All envelope mutation happens in
//! the command handlers here.

use std::io;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SmtpError};
use crate::smtp::commands::SmtpCommand;
use crate::smtp::delivery::Envelope;
use crate::smtp::reader::SessionReader;
use crate::smtp::response::{ReplyCode, SmtpResponse};
use crate::smtp::server::ServerOptions;
use crate::smtp::stream::SmtpStream;

static MAIL_ARGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)FROM:\s*<([^>]+)>\s*(?:BODY=(\S+))?").unwrap());
static RCPT_ARGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)TO:\s*<([^>]+)>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Greeting sent, waiting for HELO/EHLO.
    Init,
    /// Client identified, waiting for MAIL.
    MailWait,
    /// MAIL accepted, waiting for the first RCPT.
    RcptWait,
    /// At least one RCPT accepted, waiting for more RCPTs or DATA.
    RcptOrData,
    Done,
}

/// Envelope state accumulated over one mail transaction.
#[derive(Debug, Default)]
struct Transaction {
    reverse_path: Option<String>,
    forward_paths: Vec<String>,
    eight_bit_mime: bool,
    body: Vec<u8>,
}

pub struct SmtpSession {
    options: Arc<ServerOptions>,
    state: SessionState,
    transaction: Transaction,
}

impl SmtpSession {
    pub fn new(options: Arc<ServerOptions>) -> Self {
        Self {
            options,
            state: SessionState::Init,
            transaction: Transaction::default(),
        }
    }

    /// Run the session to completion on an accepted connection.
    pub async fn handle(mut self, stream: TcpStream) -> Result<()> {
        let mut reader = SessionReader::new(
            SmtpStream::Plain(stream),
            self.options.max_body_size,
            self.options.idle_timeout,
        );

        reader
            .send(&SmtpResponse::simple(
                ReplyCode::ServiceReady,
                format!("{} ESMTP", self.options.hostname),
            ))
            .await?;

        while self.state != SessionState::Done {
            let line = match reader.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Client closed the connection");
                    break;
                }
                Err(SmtpError::TooMuchData) => {
                    let _ = reader
                        .send(&SmtpResponse::simple(ReplyCode::TooMuchData, "Too much data"))
                        .await;
                    return Err(SmtpError::TooMuchData);
                }
                Err(e) => return Err(e),
            };

            let command = match SmtpCommand::parse(&line) {
                Ok(command) => command,
                Err(SmtpError::EmptyCommand) => continue,
                Err(SmtpError::UnknownCommand(verb)) => {
                    warn!("Unrecognised command: {}", verb);
                    reader
                        .send(&SmtpResponse::simple(ReplyCode::SyntaxError, "Syntax error"))
                        .await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.dispatch(command, &mut reader).await?;
        }

        Ok(())
    }

    async fn dispatch(
        &mut self,
        command: SmtpCommand,
        reader: &mut SessionReader,
    ) -> Result<()> {
        match command {
            SmtpCommand::Helo(domain) => self.cmd_helo(domain, reader).await,
            SmtpCommand::Ehlo(domain) => self.cmd_ehlo(domain, reader).await,
            SmtpCommand::Mail(args) => self.cmd_mail(&args, reader).await,
            SmtpCommand::Rcpt(args) => self.cmd_rcpt(&args, reader).await,
            SmtpCommand::Data => self.cmd_data(reader).await,
            SmtpCommand::Starttls => self.cmd_starttls(reader).await,
            SmtpCommand::Rset => self.cmd_rset(reader).await,
            SmtpCommand::Noop => {
                reader
                    .send(&SmtpResponse::simple(ReplyCode::Ok, "OK"))
                    .await
            }
            SmtpCommand::Quit => self.cmd_quit(reader).await,
        }
    }

    async fn cmd_helo(&mut self, domain: String, reader: &mut SessionReader) -> Result<()> {
        info!("HELO from {}", domain);
        self.transaction = Transaction::default();
        self.state = SessionState::MailWait;
        reader
            .send(&SmtpResponse::simple(ReplyCode::Ok, format!("Hello {domain}")))
            .await
    }

    async fn cmd_ehlo(&mut self, domain: String, reader: &mut SessionReader) -> Result<()> {
        info!("EHLO from {}", domain);

        let mut response = SmtpResponse::new(ReplyCode::Ok)
            .line(format!("Hello {domain}"))
            .line("PIPELINING")
            .line("8BITMIME");

        // RFC 3207: STARTTLS must not be offered once TLS is active.
        if self.options.start_tls.is_some() && !reader.is_tls() {
            response = response.line("STARTTLS");
        }
        let response = response.line("");

        self.transaction = Transaction::default();
        self.state = SessionState::MailWait;
        reader.send(&response).await
    }

    async fn cmd_mail(&mut self, args: &str, reader: &mut SessionReader) -> Result<()> {
        if self.state != SessionState::MailWait {
            return self.bad_sequence(reader).await;
        }

        let Some((sender, eight_bit_mime)) = parse_mail_args(args) else {
            return reader
                .send(&SmtpResponse::simple(
                    ReplyCode::ParameterSyntaxError,
                    "Syntax error in parameters",
                ))
                .await;
        };

        info!("Start mail transaction from {}", sender);

        let mut text = format!("Sender {sender} ok");
        if eight_bit_mime {
            text.push_str(" and 8BITMIME ok");
        }

        self.transaction = Transaction {
            reverse_path: Some(sender),
            eight_bit_mime,
            ..Transaction::default()
        };
        self.state = SessionState::RcptWait;

        reader.send(&SmtpResponse::simple(ReplyCode::Ok, text)).await
    }

    async fn cmd_rcpt(&mut self, args: &str, reader: &mut SessionReader) -> Result<()> {
        if self.state != SessionState::RcptWait && self.state != SessionState::RcptOrData {
            return self.bad_sequence(reader).await;
        }

        let Some(recipient) = parse_rcpt_args(args) else {
            return reader
                .send(&SmtpResponse::simple(
                    ReplyCode::ParameterSyntaxError,
                    "Syntax error in parameters",
                ))
                .await;
        };

        let text = format!("Recipient {recipient} ok");
        self.transaction.forward_paths.push(recipient);
        self.state = SessionState::RcptOrData;

        reader.send(&SmtpResponse::simple(ReplyCode::Ok, text)).await
    }

    async fn cmd_data(&mut self, reader: &mut SessionReader) -> Result<()> {
        if self.state != SessionState::RcptOrData {
            return self.bad_sequence(reader).await;
        }

        reader
            .send(&SmtpResponse::simple(
                ReplyCode::StartMailInput,
                "End data with <CR><LF>.<CR><LF>",
            ))
            .await?;

        debug!("Reading DATA lines");

        loop {
            let line = match reader.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    warn!("Connection closed inside DATA");
                    return Err(SmtpError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed inside DATA",
                    )));
                }
                Err(SmtpError::TooMuchData) => {
                    let _ = reader
                        .send(&SmtpResponse::simple(ReplyCode::TooMuchData, "Too much data"))
                        .await;
                    return Err(SmtpError::TooMuchData);
                }
                Err(SmtpError::IdleTimeout) => return Err(SmtpError::IdleTimeout),
                Err(e) => {
                    let _ = reader
                        .send(&SmtpResponse::simple(
                            ReplyCode::TransactionFailed,
                            "Error while reading DATA",
                        ))
                        .await;
                    return Err(e);
                }
            };

            if line.len() == 1 && line[0] == b'.' {
                break;
            }

            // Dot-stuffing: a client-doubled leading dot is stripped.
            let content = if line.len() >= 2 && line[0] == b'.' {
                &line[1..]
            } else {
                &line[..]
            };
            self.transaction.body.extend_from_slice(content);
            self.transaction.body.extend_from_slice(b"\r\n");
        }

        let response = match self.deliver().await {
            Ok(queue_id) => {
                SmtpResponse::simple(ReplyCode::Ok, format!("Ok: queued as {queue_id}"))
            }
            Err(e) => {
                error!("Delivery failed: {}", e);
                SmtpResponse::simple(
                    ReplyCode::LocalError,
                    "Requested action aborted: local error in processing",
                )
            }
        };

        self.transaction = Transaction::default();
        self.state = SessionState::MailWait;
        reader.send(&response).await
    }

    /// Hand the finished envelope to the configured handler. The
    /// transaction is consumed either way; without a handler the message
    /// is discarded.
    async fn deliver(&mut self) -> Result<String> {
        let transaction = std::mem::take(&mut self.transaction);
        let envelope = Envelope {
            source: transaction.reverse_path.unwrap_or_default(),
            destinations: transaction.forward_paths,
            eight_bit_mime: transaction.eight_bit_mime,
            body: transaction.body,
        };
        let queue_id = Uuid::new_v4().simple().to_string();

        match &self.options.handler {
            Some(handler) => {
                info!(
                    "Delegating message to handler, {} recipient(s)",
                    envelope.destinations.len()
                );
                handler.handle(envelope).await?;
            }
            None => warn!("No message handler configured, message discarded"),
        }

        Ok(queue_id)
    }

    async fn cmd_starttls(&mut self, reader: &mut SessionReader) -> Result<()> {
        if reader.is_tls() {
            return reader
                .send(&SmtpResponse::simple(ReplyCode::BadSequence, "Already in TLS"))
                .await;
        }

        // STARTTLS is only in sequence between EHLO and MAIL; whether it
        // is offered at all matters only once the sequence is right.
        if self.state != SessionState::MailWait {
            return self.bad_sequence(reader).await;
        }

        let Some(tls) = self.options.start_tls.clone() else {
            return reader
                .send(&SmtpResponse::simple(
                    ReplyCode::TlsNotAvailable,
                    "TLS not available",
                ))
                .await;
        };

        reader
            .send(&SmtpResponse::simple(
                ReplyCode::ServiceReady,
                "Ready to start TLS",
            ))
            .await?;

        let SmtpStream::Plain(tcp) = reader.take_stream() else {
            return Err(SmtpError::Tls("transport already upgraded".to_string()));
        };

        info!("Performing TLS handshake");
        let tls_stream = tls.acceptor().accept(tcp).await.map_err(|e| {
            error!("TLS handshake failed: {}", e);
            SmtpError::Tls(e.to_string())
        })?;
        info!("TLS handshake completed");

        *reader = SessionReader::new(
            SmtpStream::Tls(tls_stream),
            self.options.max_body_size,
            self.options.idle_timeout,
        );

        // RFC 3207: discard everything learned before the upgrade. The
        // client is expected to issue EHLO again.
        self.transaction = Transaction::default();
        self.state = SessionState::Init;

        Ok(())
    }

    async fn cmd_rset(&mut self, reader: &mut SessionReader) -> Result<()> {
        self.transaction = Transaction::default();
        self.state = SessionState::MailWait;
        reader.send(&SmtpResponse::simple(ReplyCode::Ok, "OK")).await
    }

    async fn cmd_quit(&mut self, reader: &mut SessionReader) -> Result<()> {
        self.state = SessionState::Done;
        reader
            .send(&SmtpResponse::simple(
                ReplyCode::Closing,
                format!("{} closing", self.options.hostname),
            ))
            .await
    }

    async fn bad_sequence(&mut self, reader: &mut SessionReader) -> Result<()> {
        reader
            .send(&SmtpResponse::simple(
                ReplyCode::BadSequence,
                "Bad sequence of commands",
            ))
            .await
    }
}

fn parse_mail_args(args: &str) -> Option<(String, bool)> {
    let captures = MAIL_ARGS.captures(args)?;
    let sender = captures.get(1)?.as_str().to_string();
    let eight_bit_mime = captures
        .get(2)
        .map_or(false, |param| param.as_str().eq_ignore_ascii_case("8BITMIME"));
    Some((sender, eight_bit_mime))
}

fn parse_rcpt_args(args: &str) -> Option<String> {
    Some(RCPT_ARGS.captures(args)?.get(1)?.as_str().to_string())
}
