//! TCP Listener and Graceful Shutdown
//!
//! The server moves through three states, in order:
//!
//! ```text
//! Listening ──(signal or accept failure)──> Draining ──(all sessions done)──> Stopped
//! ```
//!
//! While draining it stops accepting, asks the [`Handler`] to close every
//! session, and waits until each spawned session task has finished. Once
//! [`Server::run`] returns, no session task is left running.

use crate::commands::Echo;
use crate::config::ServerConfig;
use crate::connection::Handler;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listening,
    Draining,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Source of incoming client connections.
#[allow(async_fn_in_trait)]
pub trait Listener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Listener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// A bound listener plus the handler its connections are given to.
pub struct Server<L = TcpListener> {
    listener: L,
    handler: Arc<Handler>,
    state: watch::Sender<ServerState>,
}

impl Server {
    /// Binds the configured address.
    pub async fn bind(config: &ServerConfig, handler: Arc<Handler>) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::new(listener, handler))
    }
}

impl<L: Listener> Server<L> {
    pub fn new(listener: L, handler: Arc<Handler>) -> Self {
        let (state, _) = watch::channel(ServerState::Listening);
        Self {
            listener,
            handler,
            state,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handler(&self) -> Arc<Handler> {
        Arc::clone(&self.handler)
    }

    /// Subscribes to state changes.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Accepts connections until `shutdown` completes or accepting fails,
    /// then drains every session.
    pub async fn run(self, shutdown: impl Future) {
        let Server {
            listener,
            handler,
            state,
        } = self;

        // Every session task holds a clone of `done_tx`; once all of them are
        // dropped, `done_rx.recv()` yields `None`.
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        info!(address = ?listener.local_addr().ok(), "Accepting connections");

        tokio::select! {
            res = accept_loop(&listener, &handler, &done_tx) => {
                if let Err(e) = res {
                    error!(cause = %e, "Failed to accept, shutting down");
                }
            }
            _ = shutdown => {
                info!("Shutdown requested");
            }
        }

        state.send_replace(ServerState::Draining);
        drop(listener);
        handler.close();

        drop(done_tx);
        let _ = done_rx.recv().await;

        state.send_replace(ServerState::Stopped);
        info!("All sessions finished, server stopped");
    }
}

async fn accept_loop<L: Listener>(
    listener: &L,
    handler: &Arc<Handler>,
    done_tx: &mpsc::Sender<()>,
) -> io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!(client = %addr, "Accepted connection");

        let handler = Arc::clone(handler);
        let done = done_tx.clone();

        tokio::spawn(async move {
            handler.handle(stream, addr).await;
            drop(done);
        });
    }
}

/// Binds `config`'s address and serves echo sessions until a termination
/// signal arrives and every session has drained.
pub async fn listen_and_serve_with_signal(config: &ServerConfig) -> Result<(), ServerError> {
    let handler = Arc::new(Handler::new(Arc::new(Echo), config.drain_timeout));
    let server = Server::bind(config, handler).await?;
    info!(address = %config.bind_address(), "Listening");

    server.run(shutdown_signal()).await;
    Ok(())
}

/// Resolves on SIGHUP, SIGQUIT, SIGTERM or SIGINT.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::SignalKind;

    tokio::select! {
        _ = wait_for(SignalKind::hangup(), "SIGHUP") => {}
        _ = wait_for(SignalKind::quit(), "SIGQUIT") => {}
        _ = wait_for(SignalKind::terminate(), "SIGTERM") => {}
        _ = wait_for(SignalKind::interrupt(), "SIGINT") => {}
    }
}

#[cfg(unix)]
async fn wait_for(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut signal) => {
            signal.recv().await;
            info!(signal = name, "Received signal");
        }
        Err(e) => {
            error!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves on Ctrl+C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
