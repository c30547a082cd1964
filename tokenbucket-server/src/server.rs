//! TCP server and session loops
//!
//! Owns the listening socket, starts the reaper, and runs one session task
//! per accepted connection. A session reads newline-terminated commands,
//! hands each to the [`CommandProcessor`], and writes the reply line back.
//! Sessions are independent: an I/O failure tears down its own session
//! only, and the accept loop keeps going.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokenbucket::BucketRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::command::CommandProcessor;
use crate::config::Config;
use crate::connection::ConnectionRegistry;
use crate::reaper::Reaper;

const MAX_BUFFER_SIZE: usize = 64 * 1024; // 64KB max pending input per connection

/// The daemon: listener, registries, and shutdown plumbing.
pub struct Server {
    config: Config,
    listener: TcpListener,
    registry: Arc<BucketRegistry>,
    connections: Arc<ConnectionRegistry>,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    /// Bind the listening socket and build the registries.
    ///
    /// Binding is separate from [`start`](Self::start) so callers (tests,
    /// port-0 setups) can read [`local_addr`](Self::local_addr) before the
    /// accept loop runs.
    pub async fn bind(config: Config) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("Failed to bind to {}:{}", config.host, config.port))?;

        let registry = Arc::new(BucketRegistry::new(
            config.rate,
            config.capacity as f64,
            config.max_buckets,
        ));
        let (shutdown, _) = broadcast::channel(1);

        Ok(Server {
            config,
            listener,
            registry,
            connections: Arc::new(ConnectionRegistry::new()),
            shutdown,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Read-only view of the bucket registry for diagnostics.
    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }

    /// Read-only view of the live sessions for diagnostics.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Run the daemon: spawn the reaper and accept connections until
    /// [`shutdown`](Self::shutdown) is called.
    pub async fn start(&self) -> Result<()> {
        info!("Starting server on {}", self.local_addr()?);

        let reaper = Reaper::new(
            Arc::clone(&self.registry),
            self.config.gc_interval,
            self.config.gc_threshold,
        );
        let reaper_task = reaper.spawn(self.shutdown.subscribe());

        let processor = Arc::new(CommandProcessor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.connections),
            self.config.lock_duration,
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (socket, addr) = accepted?;
                    let processor = Arc::clone(&processor);
                    let connections = Arc::clone(&self.connections);
                    let shutdown_rx = self.shutdown.subscribe();

                    tokio::spawn(async move {
                        handle_session(socket, addr, processor, connections, shutdown_rx).await;
                    });
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("Shutting down server");
        // Stop accepting happened by falling out of the loop; the reaper and
        // every session hold their own shutdown receivers.
        let _ = reaper_task.await;
        Ok(())
    }

    /// Graceful shutdown: stop accepting, stop the reaper, close all
    /// registered sessions.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

async fn handle_session(
    socket: TcpStream,
    addr: std::net::SocketAddr,
    processor: Arc<CommandProcessor>,
    connections: Arc<ConnectionRegistry>,
    shutdown: broadcast::Receiver<()>,
) {
    info!("Accepted connection from {}", addr);
    let id = connections.register(addr);

    if let Err(e) = session_loop(socket, addr, &processor, shutdown).await {
        error!("Error handling connection from {}: {}", addr, e);
    }

    // Runs on every exit path: EOF, I/O error, or shutdown
    connections.unregister(id);
    info!("Closing connection to {}", addr);
}

async fn session_loop(
    mut socket: TcpStream,
    addr: std::net::SocketAddr,
    processor: &CommandProcessor,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        tokio::select! {
            read = socket.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    debug!("Connection closed by client {}", addr);
                    return Ok(());
                }

                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_BUFFER_SIZE {
                    anyhow::bail!("input buffer limit exceeded");
                }

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\r', '\n']);
                    debug!("Received {:?} from {}", line, addr);

                    let reply = processor.process(line, Instant::now());
                    socket.write_all(reply.as_bytes()).await?;
                    socket.write_all(b"\n").await?;
                }
            }
            _ = shutdown.recv() => {
                debug!("Closing connection to {} on shutdown", addr);
                return Ok(());
            }
        }
    }
}
