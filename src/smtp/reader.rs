//! Line reading with a streaming byte cap
//!
//! The reader owns the session transport and counts every byte it pulls
//! off the wire. The cap applies to the cumulative session data, command
//! and DATA phases alike; the read that pushes the count over the limit
//! returns the error and none of its bytes. After a STARTTLS upgrade the
//! session rebuilds the reader around the new transport, which restarts
//! the counter (RFC 3207 discards prior state anyway).

use std::time::Duration;

use memchr::memchr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::warn;

use crate::error::{Result, SmtpError};
use crate::smtp::response::SmtpResponse;
use crate::smtp::stream::SmtpStream;

const READ_CHUNK: usize = 8 * 1024;

pub struct SessionReader {
    stream: SmtpStream,
    buffer: Vec<u8>,
    bytes_read: usize,
    max_bytes: usize,
    idle_timeout: Duration,
}

impl SessionReader {
    pub fn new(stream: SmtpStream, max_bytes: usize, idle_timeout: Duration) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            bytes_read: 0,
            max_bytes,
            idle_timeout,
        }
    }

    /// Read the next line, without its terminator. CRLF is the expected
    /// ending; a lone LF is tolerated. Returns `Ok(None)` once the peer
    /// closes at a line boundary; a partial final line is returned as-is
    /// and the following call reports end of input.
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(idx) = memchr(b'\n', &self.buffer) {
                let mut line: Vec<u8> = self.buffer.drain(..=idx).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = match timeout(self.idle_timeout, self.stream.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => {
                    warn!("read deadline expired, dropping connection");
                    return Err(SmtpError::IdleTimeout);
                }
            };

            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.buffer)));
            }

            self.bytes_read += n;
            if self.bytes_read > self.max_bytes {
                return Err(SmtpError::TooMuchData);
            }

            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Write a packed reply and flush it out.
    pub async fn send(&mut self, response: &SmtpResponse) -> Result<()> {
        self.stream.write_all(&response.pack()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    pub fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Surrender the transport, leaving the `Upgrading` placeholder
    /// behind. Any buffered plaintext is discarded with the old reader.
    pub fn take_stream(&mut self) -> SmtpStream {
        std::mem::replace(&mut self.stream, SmtpStream::Upgrading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, connected) =
            tokio::join!(listener.accept(), TcpStream::connect(addr));
        (accepted.unwrap().0, connected.unwrap())
    }

    fn reader_for(stream: TcpStream, max_bytes: usize) -> SessionReader {
        SessionReader::new(
            SmtpStream::Plain(stream),
            max_bytes,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_reads_crlf_lines_without_terminator() {
        let (server, mut client) = stream_pair().await;
        let mut reader = reader_for(server, 1024);

        client.write_all(b"HELO one\r\nNOOP\r\n").await.unwrap();

        assert_eq!(reader.read_line().await.unwrap().unwrap(), b"HELO one");
        assert_eq!(reader.read_line().await.unwrap().unwrap(), b"NOOP");
    }

    #[tokio::test]
    async fn test_tolerates_bare_lf() {
        let (server, mut client) = stream_pair().await;
        let mut reader = reader_for(server, 1024);

        client.write_all(b"QUIT\n").await.unwrap();

        assert_eq!(reader.read_line().await.unwrap().unwrap(), b"QUIT");
    }

    #[tokio::test]
    async fn test_eof_at_line_boundary_is_none() {
        let (server, mut client) = stream_pair().await;
        let mut reader = reader_for(server, 1024);

        client.write_all(b"NOOP\r\n").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        assert_eq!(reader.read_line().await.unwrap().unwrap(), b"NOOP");
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_line_returned_at_eof() {
        let (server, mut client) = stream_pair().await;
        let mut reader = reader_for(server, 1024);

        client.write_all(b"no terminator").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        assert_eq!(
            reader.read_line().await.unwrap().unwrap(),
            b"no terminator"
        );
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cap_trips_on_the_read_that_exceeds_it() {
        let (server, mut client) = stream_pair().await;
        let mut reader = reader_for(server, 16);

        client.write_all(b"0123456789\r\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap().unwrap(), b"0123456789");

        client.write_all(b"0123456789\r\n").await.unwrap();
        assert!(matches!(
            reader.read_line().await,
            Err(SmtpError::TooMuchData)
        ));
    }

    #[tokio::test]
    async fn test_counter_is_cumulative_across_lines() {
        let (server, mut client) = stream_pair().await;
        let mut reader = reader_for(server, 1024);

        client.write_all(b"NOOP\r\nNOOP\r\n").await.unwrap();
        reader.read_line().await.unwrap();
        reader.read_line().await.unwrap();

        assert_eq!(reader.bytes_read(), 12);
    }
}
