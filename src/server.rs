//! Telemetry server loop: accept one consumer, push a record every cycle,
//! fall back to accepting again whenever a send fails.
//!
//! ```text
//!            accept ok
//! Disconnected ─────────▶ Connected ──┐ send ok
//!      ▲                     │   ▲────┘
//!      └─────────────────────┘
//!           send failed
//! ```
//!
//! The vision pipeline runs every cycle in both states, so detection keeps
//! going while nobody is connected. No cycle error ends the loop; the owning
//! process stops it from outside and then calls [`TelemetryServer::shutdown`].

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::SinkExt;
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::config::ServerConfig;
use crate::error::{TransportError, VisionError};
use crate::protocol::{self, MessageStream, TelemetryRecord};
use crate::vision::RecordSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// What one cycle of [`TelemetryServer::step`] did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A consumer connected; state is now `Connected`.
    Accepted,
    /// Nobody connected within this cycle.
    AcceptPending,
    AcceptFailed(TransportError),
    Sent,
    /// State is now `Disconnected`.
    SendFailed(TransportError),
    /// The frame could not be produced; nothing was sent, state unchanged.
    FrameSkipped(VisionError),
    /// The detector broke its output contract for this frame. The frame is
    /// dropped without a retry; state unchanged.
    FrameRejected(VisionError),
}

/// Message-oriented link to a single consumer.
///
/// `accept` must be cancel safe: the server drops a pending accept at the
/// end of each cycle and calls it again on the next one.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Connection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError>;

    async fn send(&mut self, conn: &mut Self::Connection, record: TelemetryRecord) -> Result<(), TransportError>;

    async fn close(&mut self, conn: Self::Connection);
}

// ---------------------------------------------------------------------------
// TCP transport
// ---------------------------------------------------------------------------

const CLOSE_TIMEOUT: Duration = Duration::from_millis(100);

pub struct TcpConnection {
    stream: MessageStream<TcpStream>,
    peer: SocketAddr,
}

/// JSON socket server on a TCP listener.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<TcpConnection, TransportError> {
        let (tcp, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        tcp.set_nodelay(true).map_err(TransportError::Accept)?;
        info!("[tcp] client connected: {}", peer);
        Ok(TcpConnection {
            stream: protocol::message_stream(tcp),
            peer,
        })
    }

    async fn send(&mut self, conn: &mut TcpConnection, record: TelemetryRecord) -> Result<(), TransportError> {
        protocol::send_record(&mut conn.stream, &record)
            .await
            .map_err(|e| match e {
                TransportError::Io(io) => TransportError::Send(io),
                other => other,
            })
    }

    async fn close(&mut self, mut conn: TcpConnection) {
        // 止まった相手への flush で詰まらないよう上限を付ける
        match tokio::time::timeout(CLOSE_TIMEOUT, SinkExt::<Bytes>::close(&mut conn.stream)).await {
            Ok(Ok(())) => debug!("[tcp] closed {}", conn.peer),
            Ok(Err(e)) => debug!("[tcp] close {}: {}", conn.peer, e),
            Err(_) => debug!("[tcp] close {} timed out; dropping", conn.peer),
        }
    }
}

// ---------------------------------------------------------------------------
// Server loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    /// Interval between pushed records; also bounds each accept wait.
    pub cadence: Duration,
    /// Upper bound on a single send.
    pub send_timeout: Duration,
}

impl ServerSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            cadence: config.cadence(),
            send_timeout: config.send_timeout(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub cycles: u64,
    pub accepts: u64,
    pub sent: u64,
    pub send_failures: u64,
    pub skipped_frames: u64,
    pub rejected_frames: u64,
}

pub struct TelemetryServer<R, T: Transport> {
    source: R,
    transport: T,
    connection: Option<T::Connection>,
    settings: ServerSettings,
    stats: ServerStats,
}

impl<R: RecordSource, T: Transport> TelemetryServer<R, T> {
    pub fn new(source: R, transport: T, settings: ServerSettings) -> Self {
        Self {
            source,
            transport,
            connection: None,
            settings,
            stats: ServerStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.connection.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run cycles forever.
    pub async fn run(&mut self) {
        let (width, height) = self.source.video_size();
        info!("[loop] video {}x{}, cadence {:?}", width, height, self.settings.cadence);
        info!("waiting for a connection");
        let mut summary_timer = Instant::now();
        let mut last = self.stats;
        loop {
            self.step().await;

            if summary_timer.elapsed() >= Duration::from_secs(1) {
                let now = self.stats;
                debug!(
                    "[loop] {} cycles/s, sent {}, skipped {}, rejected {}, state {:?}",
                    now.cycles - last.cycles,
                    now.sent - last.sent,
                    now.skipped_frames - last.skipped_frames,
                    now.rejected_frames - last.rejected_frames,
                    self.state()
                );
                last = now;
                summary_timer = Instant::now();
            }
        }
    }

    /// Close the current connection, if any. Called by the owning process on shutdown.
    pub async fn shutdown(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.transport.close(conn).await;
            info!("[loop] Connected -> Disconnected (shutdown)");
        }
    }

    /// One cycle: produce a record, then accept or send depending on state.
    pub async fn step(&mut self) -> CycleOutcome {
        let started = Instant::now();
        self.stats.cycles += 1;

        let record = match self.source.next_record() {
            Ok(record) => {
                debug!("{:?}", record);
                Ok(record)
            }
            Err(e) if e.is_fatal() => {
                error!("[vision] detector bug, frame rejected: {}", e);
                self.stats.rejected_frames += 1;
                Err(e)
            }
            Err(e) => {
                warn!("[vision] frame skipped: {}", e);
                self.stats.skipped_frames += 1;
                Err(e)
            }
        };

        let outcome = match self.connection.take() {
            None => self.wait_for_client().await,
            Some(conn) => self.push(conn, record).await,
        };

        if self.state() == ConnectionState::Connected {
            let elapsed = started.elapsed();
            if elapsed < self.settings.cadence {
                tokio::time::sleep(self.settings.cadence - elapsed).await;
            }
        }
        outcome
    }

    async fn wait_for_client(&mut self) -> CycleOutcome {
        match tokio::time::timeout(self.settings.cadence, self.transport.accept()).await {
            Ok(Ok(conn)) => {
                info!("[loop] Disconnected -> Connected");
                self.stats.accepts += 1;
                self.connection = Some(conn);
                CycleOutcome::Accepted
            }
            Ok(Err(e)) => {
                info!("waiting for a connection ({})", e);
                // accept 失敗が即座に返るときのビジーループ防止
                tokio::time::sleep(self.settings.cadence).await;
                CycleOutcome::AcceptFailed(e)
            }
            Err(_) => CycleOutcome::AcceptPending,
        }
    }

    async fn push(&mut self, mut conn: T::Connection, record: Result<TelemetryRecord, VisionError>) -> CycleOutcome {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                self.connection = Some(conn);
                return if e.is_fatal() {
                    CycleOutcome::FrameRejected(e)
                } else {
                    CycleOutcome::FrameSkipped(e)
                };
            }
        };

        let timeout = self.settings.send_timeout;
        let result = match tokio::time::timeout(timeout, self.transport.send(&mut conn, record)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                self.stats.sent += 1;
                self.connection = Some(conn);
                CycleOutcome::Sent
            }
            Err(e) => {
                self.stats.send_failures += 1;
                self.transport.close(conn).await;
                info!("[loop] Connected -> Disconnected ({})", e);
                info!("waiting for a connection");
                CycleOutcome::SendFailed(e)
            }
        }
    }
}
