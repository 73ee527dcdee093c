//! # recordlog-server
//!
//! TCP server for recordlog.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Line-delimited JSON framing and message dispatch
//! - Session management
//! - Command handlers for the produce/consume surface
//! - The volatile in-memory record sequence the request layer serves

pub mod config;
pub mod error;
pub mod handler;
pub mod log;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, NetworkConfig};
pub use error::ServerError;
pub use handler::{CommandHandler, ServerInfo};
pub use log::CommitLog;
pub use server::{Server, ServerConfig, ServerStats};
pub use session::{Session, SessionState};
