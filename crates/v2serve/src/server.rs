//! Listener setup and graceful shutdown.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::error::Result;
use crate::tracing::prefix;

/// Builder for the HTTP server.
pub struct ModelServer {
    addr: SocketAddr,
    name: String,
    version: String,
}

impl ModelServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], crate::config::DEFAULT_PORT)),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Set the listen address.
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Bind the listener without serving yet.
    pub async fn bind(self) -> Result<BoundServer> {
        info!("{} Starting {} v{}", prefix::OPEN, self.name, self.version);
        let listener = TcpListener::bind(self.addr).await?;
        info!("  Address: {}", listener.local_addr()?);
        Ok(BoundServer {
            listener,
            name: self.name,
        })
    }
}

/// A bound listener, ready to serve a router.
pub struct BoundServer {
    listener: TcpListener,
    name: String,
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn serve(self, app: Router) -> Result<()> {
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("{} {} shutdown complete", prefix::CLOSE, self.name);
        Ok(())
    }
}

/// Waits for the process to be asked to stop, then lets in-flight
/// requests drain. SIGTERM is only watched on Unix.
pub async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("cannot listen for Ctrl+C");
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("cannot listen for SIGTERM");
        sigterm.recv().await;
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    info!("{} {} received, draining requests", prefix::CLOSE, received);
}
