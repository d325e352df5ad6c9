//! RESP Protocol Implementation
//!
//! This module provides the wire side of FlashGate: the reply value model,
//! its encoder, and the streaming decoder.
//!
//! ## Overview
//!
//! RESP is a simple, binary-safe protocol used by Redis for client-server communication.
//! Requests arrive as arrays of bulk strings; replies may be any of the
//! [`Reply`] variants.
//!
//! ## Modules
//!
//! - `types`: Defines the `Reply` enum and serialization
//! - `decoder`: Streaming decoder producing one `Payload` per message or error
//!
//! ## Example
//!
//! ```ignore
//! use flashgate::protocol::{parse_stream, Reply};
//!
//! // Decoding a socket
//! let mut payloads = parse_stream(read_half);
//! while let Some(payload) = payloads.next().await {
//!     // ...
//! }
//!
//! // Creating responses
//! let bytes = Reply::bulk("Ariz").serialize();
//! ```

pub mod decoder;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::{parse_stream, DecodeError, Decoder, Payload, PayloadStream};
pub use types::Reply;
