//! # FlashGate - The Network Front End of FlashKV
//!
//! FlashGate terminates TCP connections for the FlashKV in-memory key-value
//! database. It decodes the RESP wire protocol into structured requests,
//! hands them to an executor, writes the replies back, and manages the
//! lifecycle of many concurrent connections, from accept to graceful drain.
//!
//! ## Features
//!
//! - **Streaming Decoder**: Line and length-prefixed reads straight off the socket,
//!   binary-safe bulk strings, recovery from malformed input
//! - **One Task per Client**: Built on Tokio, sessions run fully concurrently
//! - **Graceful Shutdown**: Signals stop the listener, close every session, and
//!   let in-flight responses finish within a bounded drain timeout
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashGate                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│  Handler    │───>│  Executor   │                  │
//! │  │ (Listener)  │    │ (sessions)  │    │  (Echo)     │                  │
//! │  └──────┬──────┘    └──────┬──────┘    └─────────────┘                  │
//! │         │                  │                                            │
//! │         │ signals          ▼                                            │
//! │         │           ┌─────────────┐                                     │
//! │         └──close──> │   RESP      │                                     │
//! │                     │   Decoder   │                                     │
//! │                     └─────────────┘                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashgate::commands::Echo;
//! use flashgate::connection::{Handler, DEFAULT_DRAIN_TIMEOUT};
//! use flashgate::server::{shutdown_signal, Server};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let handler = Arc::new(Handler::new(Arc::new(Echo), DEFAULT_DRAIN_TIMEOUT));
//!     let listener = TcpListener::bind("0.0.0.0:6379").await.unwrap();
//!
//!     // Runs until SIGINT/SIGTERM/SIGQUIT/SIGHUP, then drains every session
//!     Server::new(listener, handler).run(shutdown_signal()).await;
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP reply types, encoder and streaming decoder
//! - [`connection`]: Connection contract, client sessions and the active set
//! - [`commands`]: The executor seam between requests and replies
//! - [`server`]: Listener, signal handling and graceful shutdown
//! - [`config`]: Defaults, config file and command-line options
//! - [`logging`]: Console plus daily-rotating file logs

pub mod commands;
pub mod config;
pub mod connection;
pub mod logging;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::{Echo, Executor};
pub use config::ServerConfig;
pub use connection::{Client, Connection, Handler};
pub use protocol::{parse_stream, DecodeError, Decoder, Payload, Reply};
pub use server::{listen_and_serve_with_signal, Listener, Server, ServerState};

/// The default port FlashGate listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host FlashGate binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of FlashGate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
