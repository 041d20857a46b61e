//! SMTP reply encoding
//!
//! Replies are one or more text lines under a single three-digit code.
//! Non-final lines use the `250-text` continuation form, the final line
//! uses `250 text` (RFC 5321 section 4.2).

/// Reply codes emitted by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ReplyCode {
    ServiceReady = 220,
    Closing = 221,
    Ok = 250,
    StartMailInput = 354,
    LocalError = 451,
    TlsNotAvailable = 454,
    SyntaxError = 500,
    ParameterSyntaxError = 501,
    BadSequence = 503,
    TooMuchData = 552,
    TransactionFailed = 554,
}

/// A reply with its code and message lines, built up before packing.
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    code: ReplyCode,
    lines: Vec<String>,
}

impl SmtpResponse {
    pub fn new(code: ReplyCode) -> Self {
        Self {
            code,
            lines: Vec::new(),
        }
    }

    /// Single-line reply.
    pub fn simple(code: ReplyCode, text: impl Into<String>) -> Self {
        Self::new(code).line(text)
    }

    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    pub fn code(&self) -> ReplyCode {
        self.code
    }

    /// Encode for the wire. The last line uses a space separator, every
    /// earlier line a dash.
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let count = self.lines.len();

        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i + 1 < count { '-' } else { ' ' };
            buf.extend_from_slice(format!("{}{}{}\r\n", self.code as u16, sep, line).as_bytes());
        }

        buf
    }
}
