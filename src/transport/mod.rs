//! Line-protocol transport multiplexer.
//!
//! One TCP connection, one background reader task, one inbound FIFO and one
//! send gate. At most one command is ever outstanding, so the first
//! non-broadcast line that arrives after a command is that command's reply.
//! Broadcast lines (`message <direction>, <content>`) met while waiting are
//! handed to the event sink and skipped.

#[cfg(test)]
pub(crate) mod testing;

use crate::protocol::{self, DEAD, ELEVATION_UNDERWAY, WELCOME};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {addr} refused: {source}")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection lost")]
    Disconnected,

    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Out-of-band input delivered outside of command replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A peer broadcast; `direction` 0 means the sender shares our tile.
    Broadcast { direction: u8, content: String },
    /// Someone else started an incantation we take part in.
    ElevationUnderway,
    /// An incantation we took part in raised us to this level.
    LevelReached(u32),
}

/// The one handler for out-of-band input, fixed at construction.
pub type EventSink = Box<dyn Fn(ServerEvent) + Send + Sync>;

/// What the server told us during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Free connection slots left in our team.
    pub slots: u32,
    pub map_width: u32,
    pub map_height: u32,
}

/// The command surface every caller (controller, roles, tests) goes through.
#[async_trait]
pub trait CommandLink: Send + Sync {
    /// Send one command and wait for its reply line.
    async fn send_command(&self, command: &str) -> Result<String, TransportError>;

    /// Send one command whose reply spans several lines.
    ///
    /// Keeps the send gate until `is_terminal` accepts a line or `max_lines`
    /// reply lines have been read. Elevation progress lines count as replies
    /// here instead of being routed to the event sink.
    async fn send_command_until(
        &self,
        command: &str,
        max_lines: usize,
        is_terminal: for<'a> fn(&'a str) -> bool,
    ) -> Result<Vec<String>, TransportError>;
}

enum Inbound {
    Line(String),
    Dead,
}

struct Channel {
    writer: OwnedWriteHalf,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Connected transport. Cheap to share behind an `Arc`.
pub struct Transport {
    peer: String,
    gate: Mutex<Channel>,
    connected: Arc<AtomicBool>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    sink: EventSink,
    reply_timeout: Option<Duration>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Open the stream and start the background reader.
    pub async fn connect(host: &str, port: u16, sink: EventSink) -> Result<Self, TransportError> {
        let stream = open_stream(host, port).await?;
        Ok(Self::from_stream(stream, sink))
    }

    /// Like [`Transport::connect`], retrying a refused initial connect.
    pub async fn connect_with_retry(
        host: &str,
        port: u16,
        retries: u32,
        delay: Duration,
        sink: EventSink,
    ) -> Result<Self, TransportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match open_stream(host, port).await {
                Ok(stream) => return Ok(Self::from_stream(stream, sink)),
                Err(e) if attempt < retries.max(1) => {
                    warn!("{} (attempt {}/{}), retrying in {:?}", e, attempt, retries, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wrap an already-connected stream. Must run inside a tokio runtime.
    pub fn from_stream(stream: TcpStream, sink: EventSink) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_lines(read_half, tx, connected.clone()));
        info!("Connected to {}", peer);

        Self {
            peer,
            gate: Mutex::new(Channel {
                writer: write_half,
                inbound: rx,
            }),
            connected,
            reader: std::sync::Mutex::new(Some(reader)),
            sink,
            reply_timeout: None,
        }
    }

    /// Bound the wait for each reply line. Expiry tears the connection down.
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// `WELCOME` → team name → slot count → map size.
    pub async fn handshake(&self, team: &str) -> Result<Session, TransportError> {
        let mut chan = self.gate.lock().await;

        let greeting = self.next_reply(&mut chan, false).await?;
        if greeting != WELCOME {
            return Err(TransportError::Handshake(format!(
                "expected {}, got {:?}",
                WELCOME, greeting
            )));
        }

        self.write_line(&mut chan, team).await?;

        let slots_line = self.next_reply(&mut chan, false).await?;
        if protocol::is_ko(&slots_line) {
            return Err(TransportError::Handshake(format!(
                "team {:?} rejected by server",
                team
            )));
        }
        let slots = slots_line.trim().parse::<u32>().map_err(|_| {
            TransportError::Handshake(format!("bad slot count {:?}", slots_line))
        })?;

        let size_line = self.next_reply(&mut chan, false).await?;
        let mut dims = size_line.split_whitespace().map(str::parse::<u32>);
        let (Some(Ok(map_width)), Some(Ok(map_height))) = (dims.next(), dims.next()) else {
            return Err(TransportError::Handshake(format!(
                "bad map size {:?}",
                size_line
            )));
        };

        info!(
            "Joined team '{}' ({} free slots, map {}x{})",
            team, slots, map_width, map_height
        );
        Ok(Session {
            slots,
            map_width,
            map_height,
        })
    }

    /// Stop the reader and release the socket. Idempotent.
    pub async fn close(&self) {
        self.teardown();
        if let Ok(mut chan) = self.gate.try_lock() {
            let _ = chan.writer.shutdown().await;
        }
    }

    fn teardown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let handle = match self.reader.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    async fn write_line(&self, chan: &mut Channel, line: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        debug!("-> {}", line);
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        if let Err(e) = chan.writer.write_all(&buf).await {
            warn!("Write to {} failed: {}", self.peer, e);
            self.teardown();
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    async fn recv(&self, chan: &mut Channel) -> Result<Option<Inbound>, TransportError> {
        match self.reply_timeout {
            None => Ok(chan.inbound.recv().await),
            Some(limit) => match tokio::time::timeout(limit, chan.inbound.recv()).await {
                Ok(item) => Ok(item),
                Err(_) => {
                    warn!("No reply from {} within {:?}; closing", self.peer, limit);
                    self.teardown();
                    Err(TransportError::Disconnected)
                }
            },
        }
    }

    /// Pull lines until one is a reply, dispatching out-of-band lines.
    async fn next_reply(
        &self,
        chan: &mut Channel,
        elevation_is_reply: bool,
    ) -> Result<String, TransportError> {
        loop {
            let line = match self.recv(chan).await? {
                Some(Inbound::Line(line)) => line,
                Some(Inbound::Dead) | None => {
                    self.teardown();
                    return Err(TransportError::Disconnected);
                }
            };

            if line == DEAD {
                info!("Server reported our death");
                self.teardown();
                return Err(TransportError::Disconnected);
            }

            if line.starts_with("message ") {
                match protocol::parse_broadcast(&line) {
                    Ok((direction, content)) => {
                        (self.sink)(ServerEvent::Broadcast { direction, content })
                    }
                    Err(e) => debug!("Dropping malformed broadcast ({}): {}", e, line),
                }
                continue;
            }

            if !elevation_is_reply {
                if line == ELEVATION_UNDERWAY {
                    (self.sink)(ServerEvent::ElevationUnderway);
                    continue;
                }
                if let Some(level) = protocol::parse_level(&line) {
                    (self.sink)(ServerEvent::LevelReached(level));
                    continue;
                }
            }

            debug!("<- {}", line);
            return Ok(line);
        }
    }
}

#[async_trait]
impl CommandLink for Transport {
    async fn send_command(&self, command: &str) -> Result<String, TransportError> {
        let mut chan = self.gate.lock().await;
        self.write_line(&mut chan, command).await?;
        self.next_reply(&mut chan, false).await
    }

    async fn send_command_until(
        &self,
        command: &str,
        max_lines: usize,
        is_terminal: for<'a> fn(&'a str) -> bool,
    ) -> Result<Vec<String>, TransportError> {
        let mut chan = self.gate.lock().await;
        self.write_line(&mut chan, command).await?;

        let mut lines = Vec::new();
        while lines.len() < max_lines.max(1) {
            let line = self.next_reply(&mut chan, true).await?;
            let done = is_terminal(&line);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn open_stream(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let addr = format!("{}:{}", host, port);
    TcpStream::connect(&addr)
        .await
        .map_err(|source| TransportError::ConnectionRefused { addr, source })
}

/// Background reader: split the byte stream into lines and queue them.
async fn read_lines(
    read_half: OwnedReadHalf,
    tx: mpsc::UnboundedSender<Inbound>,
    connected: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::with_capacity(4096);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("Server closed the stream");
                break;
            }
            Ok(_) if buf.last() != Some(&b'\n') => {
                debug!("Stream ended mid-line; dropping {} bytes", buf.len());
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim().to_string();
                if tx.send(Inbound::Line(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Read error: {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = tx.send(Inbound::Dead);
}
