//! Outbound connections to the EventMonitor.
//!
//! The simulator only needs three operations from the network: connect once
//! per client, send bytes with a bounded wait, and close. Failures are
//! reported to the caller and never retried here.

use crate::config::SimulatorConfig;
use crate::error::{Result, SimulatorError};
use crate::message::Message;
use crate::ClientId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Opens one connection per client.
#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: Connection;

    async fn connect(&self, client: ClientId) -> Result<Self::Connection>;
}

/// An open connection owned by a single client task.
#[async_trait]
pub trait Connection: Send {
    /// Sends the bytes, bounded by the transport's send timeout.
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Closes the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// TCP transport with bounded connect and send.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            send_timeout,
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(
            config.addr(),
            config.timing.connect_timeout(),
            config.timing.send_timeout(),
        )
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn connect(&self, client: ClientId) -> Result<TcpConnection> {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SimulatorError::Connect {
                    addr: self.addr.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(SimulatorError::ConnectTimeout {
                    addr: self.addr.clone(),
                    timeout: self.connect_timeout,
                })
            }
        };
        stream.set_nodelay(true)?;
        debug!(client, addr = %self.addr, "TCP connection established");

        Ok(TcpConnection {
            stream: Some(stream),
            send_timeout: self.send_timeout,
        })
    }
}

/// A TCP connection; `None` once closed.
#[derive(Debug)]
pub struct TcpConnection {
    stream: Option<TcpStream>,
    send_timeout: Duration,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(SimulatorError::Closed)?;
        match tokio::time::timeout(self.send_timeout, stream.write_all(bytes)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SimulatorError::SendTimeout(self.send_timeout)),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    lines: BTreeMap<ClientId, Vec<Vec<u8>>>,
    connects: BTreeMap<ClientId, usize>,
    closes: BTreeMap<ClientId, usize>,
}

/// In-process transport that records every line it is given.
///
/// Used for dry runs and tests. Connect and send failures can be injected per
/// client. An echoing transport logs lines instead of recording them.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    log: Arc<Mutex<MemoryLog>>,
    fail_connect: HashSet<ClientId>,
    fail_send_after: HashMap<ClientId, usize>,
    send_delay: Option<Duration>,
    echo: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs every received line at info level.
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Makes `connect` fail for the given client.
    pub fn fail_connect(mut self, client: ClientId) -> Self {
        self.fail_connect.insert(client);
        self
    }

    /// Makes every send after the first `successful` ones fail for the given client.
    pub fn fail_send_after(mut self, client: ClientId, successful: usize) -> Self {
        self.fail_send_after.insert(client, successful);
        self
    }

    /// Makes every send wait before it completes.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    /// Decoded messages received for a client, in send order.
    pub fn messages(&self, client: ClientId) -> Vec<Message> {
        self.log
            .lock()
            .lines
            .get(&client)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| Message::from_wire(line).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw lines received for a client.
    pub fn raw_lines(&self, client: ClientId) -> Vec<Vec<u8>> {
        self.log.lock().lines.get(&client).cloned().unwrap_or_default()
    }

    pub fn connect_count(&self, client: ClientId) -> usize {
        self.log.lock().connects.get(&client).copied().unwrap_or(0)
    }

    pub fn close_count(&self, client: ClientId) -> usize {
        self.log.lock().closes.get(&client).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn connect(&self, client: ClientId) -> Result<MemoryConnection> {
        if self.fail_connect.contains(&client) {
            return Err(SimulatorError::Transport(format!(
                "connect refused for client {}",
                client
            )));
        }
        *self.log.lock().connects.entry(client).or_default() += 1;

        Ok(MemoryConnection {
            client,
            log: Arc::clone(&self.log),
            fail_after: self.fail_send_after.get(&client).copied(),
            sent: 0,
            open: true,
            delay: self.send_delay,
            echo: self.echo,
        })
    }
}

/// Connection handed out by [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryConnection {
    client: ClientId,
    log: Arc<Mutex<MemoryLog>>,
    fail_after: Option<usize>,
    sent: usize,
    open: bool,
    delay: Option<Duration>,
    echo: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.open {
            return Err(SimulatorError::Closed);
        }
        if self.fail_after.map_or(false, |n| self.sent >= n) {
            return Err(SimulatorError::Transport(format!(
                "send refused for client {}",
                self.client
            )));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.echo {
            info!(client = self.client, "{}", String::from_utf8_lossy(bytes).trim_end());
        } else {
            self.log
                .lock()
                .lines
                .entry(self.client)
                .or_default()
                .push(bytes.to_vec());
        }
        self.sent += 1;
        Ok(())
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            *self.log.lock().closes.entry(self.client).or_default() += 1;
        }
    }
}
