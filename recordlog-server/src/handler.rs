//! Command handlers.

use crate::error::ServerError;
use crate::log::CommitLog;
use crate::session::{Session, SessionState};
use recordlog_protocol::message::{Operation, Record, Request, Response, ResponseError};
use serde_json::{json, Value};
use std::sync::Arc;

/// Server identity reported by INFO.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "recordlog".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Command handler.
pub struct CommandHandler {
    log: Arc<CommitLog>,
    info: ServerInfo,
}

impl CommandHandler {
    /// Creates a new command handler over the given log.
    pub fn new(log: Arc<CommitLog>) -> Self {
        Self {
            log,
            info: ServerInfo::default(),
        }
    }

    /// Returns the log this handler serves.
    pub fn log(&self) -> &Arc<CommitLog> {
        &self.log
    }

    /// Handles a request and returns a response.
    pub fn handle(&self, session: &mut Session, request: &Request) -> Response {
        session.record_request();

        let result = match request.op {
            Operation::Ping => self.handle_ping(),
            Operation::Bye => self.handle_bye(session),
            Operation::Info => self.handle_info(),
            Operation::Produce => self.handle_produce(&request.params),
            Operation::Consume => self.handle_consume(&request.params),
        };

        match result {
            Ok(value) => Response::ok(&request.id, value),
            Err(e) => Response::error(
                &request.id,
                ResponseError::new(e.error_code(), e.to_string()),
            ),
        }
    }

    fn handle_ping(&self) -> Result<Value, ServerError> {
        Ok(json!({"pong": true}))
    }

    fn handle_bye(&self, session: &mut Session) -> Result<Value, ServerError> {
        session.set_state(SessionState::Closing);
        Ok(json!({"goodbye": true}))
    }

    fn handle_info(&self) -> Result<Value, ServerError> {
        Ok(json!({
            "name": self.info.name,
            "version": self.info.version,
            "records": self.log.len(),
        }))
    }

    fn handle_produce(&self, params: &Value) -> Result<Value, ServerError> {
        let record = params
            .get("record")
            .ok_or_else(|| ServerError::InvalidRequest("missing record".to_string()))?;
        let record: Record = serde_json::from_value(record.clone())?;

        let offset = self.log.append(record);
        Ok(json!({"offset": offset}))
    }

    fn handle_consume(&self, params: &Value) -> Result<Value, ServerError> {
        let offset = params
            .get("offset")
            .and_then(Value::as_u64)
            .ok_or_else(|| ServerError::InvalidRequest("missing or invalid offset".to_string()))?;

        let record = self.log.read(offset)?;
        Ok(json!({"record": record}))
    }
}
