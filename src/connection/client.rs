//! Connection Capability Contract
//!
//! [`Connection`] is what the rest of the server (and a future command
//! executor) may do with a client: write bytes back, and read or change the
//! selected logical database. [`Client`] implements it over the write half of
//! a TCP socket.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{trace, warn};

/// Number of independent logical databases a client can select.
pub const DATABASES: usize = 16;

/// Errors returned by [`Connection`] operations other than writes.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Database index outside `0..DATABASES`
    #[error("invalid DB index: {0}")]
    InvalidDbIndex(usize),
}

/// Capabilities of a client connection.
///
/// Only one writer per connection is assumed. Implementations do not
/// serialize concurrent writes; the session that owns the connection must not
/// overlap them.
#[allow(async_fn_in_trait)]
pub trait Connection {
    /// Writes `data` and flushes it to the peer.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// The currently selected logical database.
    fn db_index(&self) -> usize;

    /// Selects a logical database for subsequent key operations.
    fn select_db(&mut self, index: usize) -> Result<(), ConnectionError>;
}

/// A connected client, as seen by its session task.
#[derive(Debug)]
pub struct Client {
    writer: BufWriter<OwnedWriteHalf>,

    /// Client's address (for logging)
    addr: SocketAddr,

    db_index: usize,

    /// Responses started but not yet fully written. Reported in logs only;
    /// the drain itself is bounded by the session's write race.
    pending_writes: usize,
}

impl Client {
    pub fn new(writer: OwnedWriteHalf, addr: SocketAddr) -> Self {
        Self {
            writer: BufWriter::new(writer),
            addr,
            db_index: 0,
            pending_writes: 0,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of responses begun but not finished. Diagnostic only: at most
    /// one is ever pending, since a session writes its replies in sequence.
    pub fn pending_writes(&self) -> usize {
        self.pending_writes
    }

    pub(crate) fn begin_write(&mut self) {
        self.pending_writes += 1;
    }

    pub(crate) fn end_write(&mut self) {
        self.pending_writes = self.pending_writes.saturating_sub(1);
    }

    /// Releases the socket, giving buffered output up to `drain_timeout` to
    /// reach the peer.
    ///
    /// Does not wait on [`Client::pending_writes`]. By the time a session
    /// calls this its last write has either completed or been abandoned.
    pub async fn close(mut self, drain_timeout: Duration) {
        if self.pending_writes > 0 {
            warn!(
                client = %self.addr,
                pending = self.pending_writes,
                "Closing with unfinished writes"
            );
        }

        match tokio::time::timeout(drain_timeout, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(client = %self.addr, error = %e, "Shutdown failed"),
            Err(_) => warn!(client = %self.addr, "Drain timeout elapsed during shutdown"),
        }
    }
}

impl Connection for Client {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        trace!(client = %self.addr, bytes = data.len(), "Sent response");
        Ok(())
    }

    fn db_index(&self) -> usize {
        self.db_index
    }

    fn select_db(&mut self, index: usize) -> Result<(), ConnectionError> {
        if index >= DATABASES {
            return Err(ConnectionError::InvalidDbIndex(index));
        }
        self.db_index = index;
        Ok(())
    }
}
