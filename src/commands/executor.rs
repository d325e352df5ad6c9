//! The seam between decoded requests and whatever answers them.

use crate::connection::Client;
use crate::protocol::Reply;
use tracing::trace;

/// Turns one decoded request into one reply.
///
/// A request is normally a [`Reply::Array`] of bulk strings (command name
/// followed by its arguments; see [`Reply::as_command`]). The executor gets
/// mutable access to the client so commands like `SELECT` can change
/// per-connection state through [`crate::connection::Connection`].
///
/// Rejections (unknown command, wrong arity, ...) are ordinary
/// [`Reply::Error`] values, never faults.
pub trait Executor: Send + Sync {
    fn execute(&self, client: &mut Client, request: Reply) -> Reply;
}

/// Placeholder executor that answers every request with itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl Executor for Echo {
    fn execute(&self, client: &mut Client, request: Reply) -> Reply {
        trace!(client = %client.addr(), request = %request, "Echoing request");
        request
    }
}
