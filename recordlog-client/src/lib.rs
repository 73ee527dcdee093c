//! # recordlog-client
//!
//! Async client library for recordlog.
//!
//! One request is in flight per connection at a time: a request line goes
//! out, the matching response line comes back.

pub mod client;
pub mod error;

pub use client::Client;
pub use error::ClientError;
