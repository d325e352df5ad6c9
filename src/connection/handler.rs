//! Connection Handler Module
//!
//! This module handles individual client connections to FlashGate.
//! Each client gets its own session task that runs in a loop,
//! reading requests and sending responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. Handler::handle spawned ──── closing? ──> drop socket
//!        │
//!        ▼
//! 3. Registered in the active set
//!        │
//!        ▼
//! 4. ┌──────────────────────────────┐
//!    │      Session Loop            │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Next decoded payload    │◄├──── close signal ──┐
//!    │  └───────────┬─────────────┘ │                    │
//!    │              ▼               │                    │
//!    │  ┌─────────────────────────┐ │                    │
//!    │  │ Execute (pending += 1)  │ │                    │
//!    │  └───────────┬─────────────┘ │                    │
//!    │              ▼               │                    │
//!    │  ┌─────────────────────────┐ │                    │
//!    │  │ Write reply (pending-=1)│◄├── bounded drain ───┤
//!    │  └───────────┬─────────────┘ │                    │
//!    │              ▼               │                    │
//!    │         [Loop back]          │                    │
//!    └──────────────────────────────┘                    │
//!        │                                               │
//!        ▼                                      Handler::close()
//! 5. Deregistered, socket released
//! ```
//!
//! ## Shutdown
//!
//! [`Handler::close`] only *signals* every registered session. Each session
//! then runs its own close path: a write that is already in flight gets up to
//! the drain timeout to finish before the socket is released, so a response
//! is never cut in half by the shutdown.

use crate::commands::Executor;
use crate::connection::client::{Client, Connection};
use crate::protocol::{parse_stream, Payload, Reply};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Default time a session may spend finishing an in-flight write once
/// shutdown has been requested.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What the handler keeps about each live session.
#[derive(Debug)]
struct ClientHandle {
    addr: SocketAddr,
    close_tx: watch::Sender<bool>,
}

/// Owns every client session and the registry used to reach them at shutdown.
pub struct Handler {
    executor: Arc<dyn Executor>,

    drain_timeout: Duration,

    /// Live sessions by connection id
    active: Mutex<HashMap<u64, ClientHandle>>,

    closing: AtomicBool,

    next_id: AtomicU64,
}

impl Handler {
    /// Creates a handler that answers requests with `executor`.
    ///
    /// # Arguments
    ///
    /// * `executor` - Turns each decoded request into a reply
    /// * `drain_timeout` - How long an in-flight write may continue after
    ///   shutdown has been requested
    pub fn new(executor: Arc<dyn Executor>, drain_timeout: Duration) -> Self {
        Self {
            executor,
            drain_timeout,
            active: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Number of currently registered sessions.
    pub fn active_connections(&self) -> usize {
        self.lock_active().len()
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<u64, ClientHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a session to the active set, unless the handler is closing.
    ///
    /// The closing flag is checked under the registry lock so a session can
    /// never slip in after [`Handler::close`] has walked the set.
    fn register(&self, addr: SocketAddr) -> Option<(u64, watch::Receiver<bool>)> {
        let mut active = self.lock_active();
        if self.is_closing() {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (close_tx, close_rx) = watch::channel(false);
        active.insert(id, ClientHandle { addr, close_tx });
        Some((id, close_rx))
    }

    fn deregister(&self, id: u64) {
        if let Some(client) = self.lock_active().remove(&id) {
            trace!(client = %client.addr, id, "Deregistered");
        }
    }

    /// Runs one client session to completion.
    ///
    /// Returns once the peer disconnects, the stream fails, or the handler
    /// is closed.
    pub async fn handle(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let Some((id, mut close_rx)) = self.register(addr) else {
            debug!(client = %addr, "Handler closing, rejecting connection");
            return;
        };
        let _registration = Registration { handler: &self, id };

        info!(client = %addr, id, "Client connected");

        let (reader, writer) = stream.into_split();
        let mut payloads = parse_stream(reader);
        let mut client = Client::new(writer, addr);

        loop {
            let payload = tokio::select! {
                biased;
                _ = closed(&mut close_rx) => {
                    debug!(client = %addr, "Closing session on shutdown");
                    break;
                }
                payload = payloads.next() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            if let Err(e) = &payload {
                if e.is_transport() {
                    if e.is_peer_closed() {
                        debug!(client = %addr, "Client disconnected");
                    } else {
                        warn!(client = %addr, error = %e, "Connection error");
                    }
                    break;
                }
            }

            if let Err(e) = self.respond(&mut client, payload, &mut close_rx).await {
                warn!(client = %addr, error = %e, "Failed to send response");
                break;
            }
        }

        payloads.close().await;
        client.close(self.drain_timeout).await;
        info!(client = %addr, id, "Client session ended");
    }

    /// Processes one payload and writes the reply.
    ///
    /// The write races the close signal: once shutdown is requested, an
    /// unfinished write gets at most `drain_timeout` more.
    async fn respond(
        &self,
        client: &mut Client,
        payload: Payload,
        close_rx: &mut watch::Receiver<bool>,
    ) -> io::Result<()> {
        client.begin_write();
        let reply = self.process(client, payload);
        let bytes = reply.serialize();

        let result = {
            let write = client.write(&bytes);
            tokio::pin!(write);

            tokio::select! {
                res = &mut write => res,
                _ = closed(close_rx) => {
                    trace!("Shutdown requested mid-write, draining");
                    match tokio::time::timeout(self.drain_timeout, &mut write).await {
                        Ok(res) => res,
                        Err(_) => Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "drain timeout elapsed before the response was written",
                        )),
                    }
                }
            }
        };

        client.end_write();
        result
    }

    fn process(&self, client: &mut Client, payload: Payload) -> Reply {
        match payload {
            Ok(request) => self.executor.execute(client, request),
            Err(e) => {
                debug!(client = %client.addr(), error = %e, "Protocol error");
                Reply::error(format!(
                    "ERR Protocol error: '{}'",
                    e.unit_text().unwrap_or_default()
                ))
            }
        }
    }

    /// Starts shutting down.
    ///
    /// New connections are rejected from now on, and every registered session
    /// is told to close. This does not wait for the sessions to finish.
    pub fn close(&self) {
        info!("Handler shutting down");
        self.closing.store(true, Ordering::SeqCst);

        let active = self.lock_active();
        for (id, client) in active.iter() {
            debug!(client = %client.addr, id, "Closing client");
            client.close_tx.send_replace(true);
        }
    }
}

/// Removes the session from the active set when it ends, panics included.
struct Registration<'a> {
    handler: &'a Handler,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.handler.deregister(self.id);
    }
}

/// Resolves once the session has been told to close.
async fn closed(close_rx: &mut watch::Receiver<bool>) {
    // An error means the sender is gone, which only happens after deregistration.
    let _ = close_rx.wait_for(|closed| *closed).await;
}
