//! SMTP listener
//!
//! Binds a TCP socket and spawns one independent session task per
//! accepted connection. Sessions share nothing but the immutable
//! [`ServerOptions`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Result;
use crate::security::TlsConfig;
use crate::smtp::delivery::MessageHandler;
use crate::smtp::session::SmtpSession;

/// 56 MiB, the cap inherited from the reference deployment.
pub const DEFAULT_MAX_BODY_SIZE: usize = 56 * 1024 * 1024;

/// RFC 5321 section 4.5.3.2 suggests five minutes.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Immutable per-server settings, shared by every session.
pub struct ServerOptions {
    /// Name announced in the greeting and QUIT replies.
    pub hostname: String,
    /// Present iff STARTTLS is offered.
    pub start_tls: Option<TlsConfig>,
    /// Cap on cumulative bytes read per transport, command and DATA
    /// phases included.
    pub max_body_size: usize,
    pub idle_timeout: Duration,
    /// Consumer of accepted envelopes; absent means accepted messages
    /// are discarded.
    pub handler: Option<Arc<dyn MessageHandler>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            start_tls: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            handler: None,
        }
    }
}

pub struct SmtpServer {
    options: Arc<ServerOptions>,
}

impl SmtpServer {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Bind `addr` and accept in a background task. Bind errors are
    /// returned to the caller; accept errors are logged and the loop
    /// keeps going.
    pub async fn listen(self, addr: &str) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("SMTP server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let options = self.options;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("SMTP listener shutting down");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((socket, peer)) => {
                            info!("New SMTP connection from {}", peer);
                            let session = SmtpSession::new(options.clone());
                            tokio::spawn(async move {
                                if let Err(e) = session.handle(socket).await {
                                    error!("Session error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }

    /// Bind `addr` and serve until the process is stopped.
    pub async fn run(self, addr: &str) -> Result<()> {
        let handle = self.listen(addr).await?;
        handle.wait().await;
        Ok(())
    }
}

/// Running listener. Dropping the handle stops the accept loop;
/// in-flight sessions keep draining on their own connections.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address, with the ephemeral port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections.
    pub fn close(self) {
        let _ = self.shutdown.send(());
    }

    /// Wait for the accept loop to end.
    pub async fn wait(self) {
        let ServerHandle { shutdown, task, .. } = self;
        // Keep the shutdown sender alive while waiting, otherwise the
        // loop would exit immediately.
        let _shutdown = shutdown;
        let _ = task.await;
    }
}

/// Start an SMTP receiver on `addr` with the given options.
pub async fn listen(addr: &str, options: ServerOptions) -> Result<ServerHandle> {
    SmtpServer::new(options).listen(addr).await
}
