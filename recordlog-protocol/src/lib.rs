//! # recordlog-protocol
//!
//! Wire protocol implementation for recordlog.
//!
//! This crate provides:
//! - Line-delimited JSON framing
//! - Request/Response envelope types
//! - Error codes and protocol constants

pub mod codec;
pub mod error;
pub mod message;

pub use codec::LineDecoder;
pub use error::{ErrorCode, ProtocolError};
pub use message::{Operation, Record, Request, Response, ResponseError, ResponseStatus};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for the recordlog server.
pub const DEFAULT_PORT: u16 = 7611;

/// Maximum length of a single request or response line (16 MiB).
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;
