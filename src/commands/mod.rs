//! Command Execution Module
//!
//! This module is where decoded requests get turned into replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Decoder   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Executor     │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Keyspace        │  (not part of FlashGate)
//! └─────────────────┘
//! ```
//!
//! Only the [`Echo`] executor ships here. A real command table plugs in by
//! implementing [`Executor`] and handing it to
//! [`Handler::new`](crate::connection::Handler::new).

pub mod executor;

pub use executor::{Echo, Executor};
