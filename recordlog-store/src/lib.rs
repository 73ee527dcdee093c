//! # recordlog-store
//!
//! Append-only binary record store for recordlog.
//!
//! This crate provides a durable, position-addressed log over a single file:
//! - Fixed-width length-prefix framing
//! - Buffered writes with flush-before-read visibility
//! - Fully serialized access from concurrent callers

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::Store;

/// Width in bytes of the big-endian length prefix preceding every record.
pub const LEN_WIDTH: usize = 8;

/// Write buffer capacity. Staged bytes drain to the file once the buffer
/// grows past this, before any read, and on close.
pub const WRITE_BUFFER_SIZE: usize = 8 * 1024;
