//! High-level client API.

use crate::error::ClientError;
use recordlog_protocol::codec::{self, LineDecoder};
use recordlog_protocol::message::{Operation, Record, Request};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use uuid::Uuid;

struct Connection {
    stream: TcpStream,
    decoder: LineDecoder,
}

/// High-level client for recordlog.
pub struct Client {
    conn: Mutex<Connection>,
}

impl Client {
    /// Connects to a recordlog server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        tracing::debug!("Connected to {}", stream.peer_addr()?);

        Ok(Self {
            conn: Mutex::new(Connection {
                stream,
                decoder: LineDecoder::new(),
            }),
        })
    }

    /// Sends a request and waits for the matching response.
    async fn request(&self, op: Operation, params: Value) -> Result<Value, ClientError> {
        let request = Request::new(Uuid::new_v4().to_string(), op).with_params(params);

        let mut conn = self.conn.lock().await;
        conn.stream
            .write_all(&codec::encode_request(&request)?)
            .await?;

        let mut buf = [0u8; 8192];
        let response = loop {
            if let Some(response) = conn.decoder.decode_response()? {
                break response;
            }
            let n = conn.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            conn.decoder.extend(&buf[..n]);
        };
        drop(conn);

        if response.id != request.id {
            return Err(ClientError::UnexpectedResponse {
                expected: request.id,
                got: response.id,
            });
        }

        if response.is_error() {
            let err = response.error.unwrap();
            return Err(ClientError::Server {
                code: err.code,
                message: err.message,
                retryable: err.retryable,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Pings the server.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.request(Operation::Ping, json!({})).await?;
        Ok(())
    }

    /// Gets server info.
    pub async fn info(&self) -> Result<Value, ClientError> {
        self.request(Operation::Info, json!({})).await
    }

    /// Appends a record, returning the offset the server stored it under.
    pub async fn produce(&self, value: impl Into<Vec<u8>>) -> Result<u64, ClientError> {
        let params = json!({"record": {"value": value.into()}});

        let result = self.request(Operation::Produce, params).await?;
        result["offset"]
            .as_u64()
            .ok_or(recordlog_protocol::ProtocolError::MissingField("offset").into())
    }

    /// Reads the record stored under the given offset.
    pub async fn consume(&self, offset: u64) -> Result<Record, ClientError> {
        let result = self
            .request(Operation::Consume, json!({"offset": offset}))
            .await?;

        let record = result
            .get("record")
            .ok_or(recordlog_protocol::ProtocolError::MissingField("record"))?;
        Ok(serde_json::from_value(record.clone())?)
    }

    /// Tells the server the session is done.
    pub async fn bye(&self) -> Result<(), ClientError> {
        self.request(Operation::Bye, json!({})).await?;
        Ok(())
    }
}
