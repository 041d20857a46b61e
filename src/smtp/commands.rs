//! SMTP command parsing
//!
//! Parsing here is purely syntactic: a line is split on the first space
//! into a verb and its raw argument tail. Validating the tail (the
//! `FROM:<...>` / `TO:<...>` path forms) is the verb handlers' concern.

use crate::error::{Result, SmtpError};

/// A single parsed command line. MAIL and RCPT carry their raw argument
/// tails, to be matched against the path grammars by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    Mail(String),
    Rcpt(String),
    Data,
    Rset,
    Noop,
    Quit,
    Starttls,
}

impl SmtpCommand {
    pub fn parse(line: &[u8]) -> Result<Self> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Err(SmtpError::EmptyCommand);
        }

        let (verb, args) = match line.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(SmtpCommand::Helo(args.to_string())),
            "EHLO" => Ok(SmtpCommand::Ehlo(args.to_string())),
            "MAIL" => Ok(SmtpCommand::Mail(args.to_string())),
            "RCPT" => Ok(SmtpCommand::Rcpt(args.to_string())),
            "DATA" => Ok(SmtpCommand::Data),
            "RSET" => Ok(SmtpCommand::Rset),
            "NOOP" => Ok(SmtpCommand::Noop),
            "QUIT" => Ok(SmtpCommand::Quit),
            "STARTTLS" => Ok(SmtpCommand::Starttls),
            other => Err(SmtpError::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helo() {
        let cmd = SmtpCommand::parse(b"HELO example.com").unwrap();
        assert_eq!(cmd, SmtpCommand::Helo("example.com".to_string()));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let cmd = SmtpCommand::parse(b"ehlo example.com").unwrap();
        assert_eq!(cmd, SmtpCommand::Ehlo("example.com".to_string()));

        let cmd = SmtpCommand::parse(b"QuIt").unwrap();
        assert_eq!(cmd, SmtpCommand::Quit);
    }

    #[test]
    fn test_parse_mail_keeps_raw_tail() {
        let cmd = SmtpCommand::parse(b"MAIL FROM:<sender@example.com> BODY=8BITMIME").unwrap();
        assert_eq!(
            cmd,
            SmtpCommand::Mail("FROM:<sender@example.com> BODY=8BITMIME".to_string())
        );
    }

    #[test]
    fn test_parse_rcpt_keeps_raw_tail() {
        let cmd = SmtpCommand::parse(b"RCPT TO:<recipient@example.com>").unwrap();
        assert_eq!(cmd, SmtpCommand::Rcpt("TO:<recipient@example.com>".to_string()));
    }

    #[test]
    fn test_parse_bare_verbs() {
        assert_eq!(SmtpCommand::parse(b"DATA").unwrap(), SmtpCommand::Data);
        assert_eq!(SmtpCommand::parse(b"RSET").unwrap(), SmtpCommand::Rset);
        assert_eq!(SmtpCommand::parse(b"NOOP").unwrap(), SmtpCommand::Noop);
        assert_eq!(SmtpCommand::parse(b"STARTTLS").unwrap(), SmtpCommand::Starttls);
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(matches!(
            SmtpCommand::parse(b"VRFY user"),
            Err(SmtpError::UnknownCommand(verb)) if verb == "VRFY"
        ));
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(matches!(
            SmtpCommand::parse(b""),
            Err(SmtpError::EmptyCommand)
        ));
        assert!(matches!(
            SmtpCommand::parse(b"   "),
            Err(SmtpError::EmptyCommand)
        ));
    }
}
