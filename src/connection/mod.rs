//! Connection Handler Module
//!
//! This module manages individual client connections to FlashGate.
//! Each client connection is handled by its own async task, allowing
//! the server to handle thousands of concurrent clients efficiently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Handler                                │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Decode RESP │───>│  Execute    │───>│ Write reply │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                                             │
//! │  active set: id -> close signal   (walked on shutdown)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use flashgate::commands::Echo;
//! use flashgate::connection::{Handler, DEFAULT_DRAIN_TIMEOUT};
//! use std::sync::Arc;
//!
//! let handler = Arc::new(Handler::new(Arc::new(Echo), DEFAULT_DRAIN_TIMEOUT));
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(Arc::clone(&handler).handle(stream, addr));
//! ```

pub mod client;
pub mod handler;

// Re-export commonly used types
pub use client::{Client, Connection, ConnectionError, DATABASES};
pub use handler::{Handler, DEFAULT_DRAIN_TIMEOUT};
