//! Backend Driver
//!
//! A single RESP connection to the backend. Every caller of the bridge
//! shares it, so request/response pairs are serialized behind an async
//! mutex: a round trip finishes before the next one starts, which keeps
//! reply ordering trivially correct.
//!
//! ## Round Trip
//!
//! ```text
//!   lock wire ──> write frame(s) ──> flush
//!                                      │
//!                                      ▼
//!              ┌──────────────────────────────────────┐
//!              │ parse buffer ──> complete? ──> yes ──┼──> reply
//!              │      ▲               │               │
//!              │      │              no               │
//!              │      └── read more ◄─┘               │
//!              └──────────────────────────────────────┘
//! ```
//!
//! The round trip runs on its own task holding the wire lock, so a caller
//! that gives up early cannot leave an unread reply behind for the next
//! one. If the socket fails mid-call the wire is dropped and the next call
//! reconnects with the same options (AUTH and SELECT are replayed).

use crate::config::ConnectionOptions;
use crate::error::BackendError;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{RespParser, RespValue};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

/// Upper bound for buffered, unparsed reply data: the largest bulk the
/// parser accepts plus room for its header.
pub const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// A live connection to the key-value backend.
///
/// Frames are already-encoded command parts, name first.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Sends one command and returns its reply. Error replies become
    /// [`BackendError::Reply`].
    async fn call(&self, frame: Vec<Bytes>) -> Result<RespValue, BackendError>;

    /// Sends `MULTI`, every frame, then `EXEC` as one atomic unit and returns
    /// the EXEC reply elements in submission order. Per-command error
    /// replies are returned in place, not raised.
    async fn transaction(&self, frames: Vec<Vec<Bytes>>) -> Result<Vec<RespValue>, BackendError>;

    /// Traffic counters, for backends that keep them.
    fn stats(&self) -> Option<Arc<ConnectionStats>> {
        None
    }
}

/// Opens backends. The connection loop only talks to this trait.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects, verifies liveness, and reports the server version.
    async fn connect(&self, options: &ConnectionOptions) -> Result<Connected, BackendError>;
}

/// A verified backend plus its version string for diagnostics.
pub struct Connected {
    pub backend: Arc<dyn Backend>,
    pub version: String,
}

/// Traffic counters for the shared connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub commands_sent: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub reconnects: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn commands_sent(&self, count: usize) {
        self.commands_sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn reconnected(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub commands_sent: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub reconnects: u64,
}

/// The socket plus its read buffer.
struct Wire {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
    max_buffer: usize,
}

impl Wire {
    async fn open(options: &ConnectionOptions, max_buffer: usize) -> Result<Self, BackendError> {
        let stream = TcpStream::connect(options.address()).await?;
        stream.set_nodelay(true)?;

        let mut wire = Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            max_buffer,
        };
        wire.handshake(options).await?;
        Ok(wire)
    }

    async fn handshake(&mut self, options: &ConnectionOptions) -> Result<(), BackendError> {
        if let Some(password) = &options.password {
            let mut frame = vec![Bytes::from_static(b"AUTH")];
            if let Some(user) = &options.username {
                frame.push(Bytes::from(user.clone()));
            }
            frame.push(Bytes::from(password.clone()));
            self.round_trip(&[frame]).await?;
        }

        if options.database != 0 {
            let frame = vec![
                Bytes::from_static(b"SELECT"),
                Bytes::from(options.database.to_string()),
            ];
            self.round_trip(&[frame]).await?;
        }

        Ok(())
    }

    /// Writes every frame, flushes once, and reads one reply per frame.
    async fn exchange(
        &mut self,
        frames: &[Vec<Bytes>],
        stats: &ConnectionStats,
    ) -> Result<Vec<RespValue>, BackendError> {
        let mut out = Vec::new();
        for frame in frames {
            RespValue::command(frame.clone()).serialize_into(&mut out);
        }
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        stats.bytes_written(out.len());
        stats.commands_sent(frames.len());
        trace!(frames = frames.len(), bytes = out.len(), "Sent frames");

        let mut replies = Vec::with_capacity(frames.len());
        for _ in frames {
            replies.push(self.read_reply(stats).await?);
        }
        Ok(replies)
    }

    /// Single frame exchange that turns an error reply into an error.
    async fn round_trip(&mut self, frames: &[Vec<Bytes>]) -> Result<RespValue, BackendError> {
        let stats = ConnectionStats::new();
        let reply = self
            .exchange(frames, &stats)
            .await?
            .pop()
            .ok_or_else(|| BackendError::UnexpectedReply("missing reply".to_string()))?;
        match reply {
            RespValue::Error(msg) => Err(BackendError::Reply(msg)),
            other => Ok(other),
        }
    }

    async fn read_reply(&mut self, stats: &ConnectionStats) -> Result<RespValue, BackendError> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(value);
                }
            }
            self.read_more_data(stats).await?;
        }
    }

    async fn read_more_data(&mut self, stats: &ConnectionStats) -> Result<(), BackendError> {
        if self.buffer.len() >= self.max_buffer {
            return Err(BackendError::ReplyTooLarge {
                limit: self.max_buffer,
            });
        }
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(BackendError::Closed);
        }

        stats.bytes_read(n);
        trace!(bytes = n, "Read data");
        Ok(())
    }
}

/// The shared RESP connection.
pub struct RespConnection {
    options: ConnectionOptions,
    wire: Arc<Mutex<Option<Wire>>>,
    stats: Arc<ConnectionStats>,
    max_buffer: usize,
}

impl RespConnection {
    /// Opens the socket and authenticates.
    pub async fn connect(options: ConnectionOptions) -> Result<Self, BackendError> {
        Self::connect_with_limit(options, MAX_BUFFER_SIZE).await
    }

    /// Like [`RespConnection::connect`], refusing replies that need more
    /// than `max_buffer` bytes of read buffer.
    pub async fn connect_with_limit(
        options: ConnectionOptions,
        max_buffer: usize,
    ) -> Result<Self, BackendError> {
        let wire = Wire::open(&options, max_buffer).await?;
        debug!(server = %options.address(), "Backend socket opened");

        Ok(Self {
            options,
            wire: Arc::new(Mutex::new(Some(wire))),
            stats: Arc::new(ConnectionStats::new()),
            max_buffer,
        })
    }

    /// Runs one exchange on the wire, reconnecting first if the previous
    /// exchange broke the socket.
    async fn with_wire(&self, frames: Vec<Vec<Bytes>>) -> Result<Vec<RespValue>, BackendError> {
        let guard = Arc::clone(&self.wire).lock_owned().await;
        let options = self.options.clone();
        let stats = Arc::clone(&self.stats);
        let max_buffer = self.max_buffer;

        // Detached: dropping the caller's future does not cancel the exchange.
        tokio::spawn(run_exchange(guard, options, stats, max_buffer, frames))
            .await
            .map_err(|e| BackendError::Io(std::io::Error::other(e)))?
    }

    /// `PING` must answer `PONG`.
    pub async fn ping(&self) -> Result<(), BackendError> {
        let reply = self.call(vec![Bytes::from_static(b"PING")]).await?;
        match reply.as_str() {
            Some("PONG") => Ok(()),
            _ => Err(BackendError::UnexpectedReply(format!(
                "expected PONG, got {}",
                reply
            ))),
        }
    }

    /// Reads `redis_version` from `INFO server`.
    pub async fn server_version(&self) -> Result<Option<String>, BackendError> {
        let reply = self
            .call(vec![Bytes::from_static(b"INFO"), Bytes::from_static(b"server")])
            .await?;
        Ok(reply.as_str().and_then(parse_version))
    }
}

#[async_trait]
impl Backend for RespConnection {
    async fn call(&self, frame: Vec<Bytes>) -> Result<RespValue, BackendError> {
        let reply = self
            .with_wire(vec![frame])
            .await?
            .pop()
            .ok_or_else(|| BackendError::UnexpectedReply("missing reply".to_string()))?;

        match reply {
            RespValue::Error(msg) => Err(BackendError::Reply(msg)),
            other => Ok(other),
        }
    }

    async fn transaction(&self, frames: Vec<Vec<Bytes>>) -> Result<Vec<RespValue>, BackendError> {
        let mut pipeline = Vec::with_capacity(frames.len() + 2);
        pipeline.push(vec![Bytes::from_static(b"MULTI")]);
        pipeline.extend(frames);
        pipeline.push(vec![Bytes::from_static(b"EXEC")]);

        let mut replies = self.with_wire(pipeline).await?;
        let exec = replies
            .pop()
            .ok_or_else(|| BackendError::UnexpectedReply("missing EXEC reply".to_string()))?;

        // A command rejected while queueing makes EXEC fail with EXECABORT;
        // the queueing error is the useful message.
        let queue_error = replies.into_iter().find_map(|r| match r {
            RespValue::Error(msg) => Some(msg),
            _ => None,
        });

        match exec {
            RespValue::Array(results) => Ok(results),
            RespValue::Null => Err(BackendError::Aborted),
            RespValue::Error(msg) => Err(BackendError::Reply(queue_error.unwrap_or(msg))),
            other => Err(BackendError::UnexpectedReply(other.to_string())),
        }
    }

    fn stats(&self) -> Option<Arc<ConnectionStats>> {
        Some(Arc::clone(&self.stats))
    }
}

/// One exchange on the locked wire. Any failure drops the wire, since part
/// of a reply may still be unread.
async fn run_exchange(
    mut guard: OwnedMutexGuard<Option<Wire>>,
    options: ConnectionOptions,
    stats: Arc<ConnectionStats>,
    max_buffer: usize,
    frames: Vec<Vec<Bytes>>,
) -> Result<Vec<RespValue>, BackendError> {
    if guard.is_none() {
        warn!(server = %options.address(), "Redis client reconnecting...");
        *guard = Some(Wire::open(&options, max_buffer).await?);
        stats.reconnected();
    }

    let Some(wire) = guard.as_mut() else {
        return Err(BackendError::Closed);
    };

    let result = wire.exchange(&frames, &stats).await;
    if let Err(e) = &result {
        warn!(error = %e, "Redis Client Error");
        *guard = None;
    }
    result
}

/// Connects over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Connected, BackendError> {
        if options.tls {
            return Err(BackendError::InvalidArgument(
                "rediss:// (TLS) connections are not supported".to_string(),
            ));
        }

        let connection = RespConnection::connect(options.clone()).await?;
        connection.ping().await?;

        let version = match connection.server_version().await? {
            Some(v) => format!("[Redis {}]", v),
            None => "[Redis]".to_string(),
        };

        Ok(Connected {
            backend: Arc::new(connection),
            version,
        })
    }
}

fn parse_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("redis_version:"))
        .map(|v| v.trim().to_string())
}
