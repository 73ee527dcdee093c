//! TCP server implementation.

use crate::error::ServerError;
use crate::handler::CommandHandler;
use crate::log::CommitLog;
use crate::session::{Session, SessionState};
use recordlog_protocol::codec::{self, LineDecoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7611".parse().unwrap(),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for recordlog.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Creates a new server serving the given log.
    pub fn new(config: ServerConfig, log: Arc<CommitLog>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(CommandHandler::new(log)),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
            local_addr: parking_lot::Mutex::new(None),
        }
    }

    /// Runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        *self.local_addr.lock() = Some(listener.local_addr()?);
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("Server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let config = self.config.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    stream,
                                    addr,
                                    handler,
                                    config,
                                    &stats,
                                    &mut conn_shutdown,
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handles a single connection.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<CommandHandler>,
        config: ServerConfig,
        stats: &ServerStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", addr);

        let mut session = Session::new(addr);
        let mut decoder = LineDecoder::new();
        let mut buf = [0u8; 8192];

        loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            return Ok(());
                        }
                        Ok(n) => {
                            tracing::debug!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                    }
                }

                _ = tokio::time::sleep(config.idle_timeout) => {
                    if session.idle_duration() > config.idle_timeout {
                        tracing::debug!("[{}] Idle timeout", addr);
                        return Ok(());
                    }
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    return Err(ServerError::ShuttingDown);
                }
            }

            // Process any complete requests
            while let Some(request) = decoder.decode_request()? {
                tracing::info!("[{}] Request: {:?} (id={})", addr, request.op, request.id);
                stats.requests_total.fetch_add(1, Ordering::Relaxed);

                let response = handler.handle(&mut session, &request);

                tracing::info!(
                    "[{}] Response: {} (id={})",
                    addr,
                    if response.is_ok() { "OK" } else { "ERROR" },
                    response.id
                );

                let response_bytes = codec::encode_response(&response)?;
                stream.write_all(&response_bytes).await?;

                if session.state() == SessionState::Closing {
                    tracing::debug!("[{}] Session closing", addr);
                    return Ok(());
                }
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the bound address once the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlog_protocol::message::{Operation, Request, Response};
    use recordlog_protocol::ErrorCode;
    use serde_json::json;

    fn test_server() -> Arc<Server> {
        let log = Arc::new(CommitLog::new());
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        Arc::new(Server::new(config, log))
    }

    async fn spawn_server(server: Arc<Server>) -> SocketAddr {
        let srv = server.clone();
        tokio::spawn(async move { srv.run().await });

        loop {
            if let Some(addr) = server.local_addr() {
                return addr;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn roundtrip(
        stream: &mut TcpStream,
        decoder: &mut LineDecoder,
        request: &Request,
    ) -> Response {
        stream
            .write_all(&codec::encode_request(request).unwrap())
            .await
            .unwrap();

        let mut buf = [0u8; 4096];
        loop {
            if let Some(response) = decoder.decode_response().unwrap() {
                return response;
            }
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before response");
            decoder.extend(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_server_not_running_initially() {
        let server = test_server();
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_produce_consume_over_tcp() {
        let server = test_server();
        let addr = spawn_server(server.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = LineDecoder::new();

        let request = Request::new("1", Operation::Produce)
            .with_params(json!({"record": {"value": b"text record".to_vec()}}));
        let response = roundtrip(&mut stream, &mut decoder, &request).await;
        assert!(response.is_ok());
        assert_eq!(response.result.unwrap()["offset"], 0);

        let request = Request::new("2", Operation::Consume).with_params(json!({"offset": 0}));
        let response = roundtrip(&mut stream, &mut decoder, &request).await;
        assert!(response.is_ok());
        let record = response.result.unwrap()["record"].clone();
        assert_eq!(
            record["value"],
            serde_json::to_value(b"text record".to_vec()).unwrap()
        );

        let request = Request::new("3", Operation::Consume).with_params(json!({"offset": 1}));
        let response = roundtrip(&mut stream, &mut decoder, &request).await;
        assert!(response.is_error());
        assert_eq!(response.error.unwrap().code, ErrorCode::OffsetNotFound);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bye_closes_connection() {
        let server = test_server();
        let addr = spawn_server(server.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = LineDecoder::new();

        let response =
            roundtrip(&mut stream, &mut decoder, &Request::new("1", Operation::Bye)).await;
        assert!(response.is_ok());

        // The server closes its side after BYE.
        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_requests_counted() {
        let server = test_server();
        let addr = spawn_server(server.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = LineDecoder::new();
        roundtrip(&mut stream, &mut decoder, &Request::new("1", Operation::Ping)).await;
        roundtrip(&mut stream, &mut decoder, &Request::new("2", Operation::Info)).await;

        assert_eq!(server.stats().requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(server.stats().connections_total.load(Ordering::Relaxed), 1);

        server.shutdown();
    }
}
