//! UDP RTP/RTCP network sink with periodic sender reports.

mod rtcp;
mod stats;

pub use rtcp::{SenderReport, NTP_UNIX_OFFSET, RTCP_PT_SENDER_REPORT, SENDER_REPORT_SIZE};
pub use stats::SinkStats;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::rtp::{RtpPacket, RTP_CLOCK_RATE};

/// Default interval between RTCP sender reports.
pub const DEFAULT_RTCP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("sink is {0:?}, not ready")]
    NotReady(SocketState),
}

/// Configuration for the RTP network sink.
#[derive(Debug, Clone)]
pub struct RtpSinkConfig {
    pub remote_host: String,
    /// RTP destination port; RTCP goes to `rtp_port + 1`.
    pub rtp_port: u16,
    /// Local port (0 = auto-assign); RTCP binds the next port when set.
    pub local_port: u16,
    pub ssrc: u32,
    pub rtcp_interval: Duration,
}

impl RtpSinkConfig {
    pub fn new(remote_host: impl Into<String>, rtp_port: u16, ssrc: u32) -> Self {
        Self {
            remote_host: remote_host.into(),
            rtp_port,
            local_port: 0,
            ssrc,
            rtcp_interval: DEFAULT_RTCP_INTERVAL,
        }
    }
}

/// RTP socket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Initial,
    Opening,
    Ready,
    Failed,
    Closed,
}

struct Sockets {
    rtp: Arc<UdpSocket>,
    rtcp: Arc<UdpSocket>,
}

/// UDP sink for RTP packets.
///
/// Owns two sockets connected to `(remote, rtp_port)` and
/// `(remote, rtp_port + 1)`. While at least one RTP packet has been sent, a
/// background task emits one RTCP sender report per interval. Send failures
/// are counted and logged, never fatal.
pub struct RtpSink {
    config: RtpSinkConfig,
    state: Mutex<SocketState>,
    sockets: Mutex<Option<Sockets>>,

    packets_sent: AtomicU32,
    octets_sent: AtomicU32,
    packets_dropped: AtomicU64,
    send_errors: AtomicU64,
    reports_sent: AtomicU64,

    rtcp_task: Mutex<Option<JoinHandle<()>>>,
}

impl RtpSink {
    pub fn new(config: RtpSinkConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(SocketState::Initial),
            sockets: Mutex::new(None),
            packets_sent: AtomicU32::new(0),
            octets_sent: AtomicU32::new(0),
            packets_dropped: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            reports_sent: AtomicU64::new(0),
            rtcp_task: Mutex::new(None),
        })
    }

    /// Creates a sink and opens it in one step.
    pub async fn connect(config: RtpSinkConfig) -> Result<Arc<Self>, SinkError> {
        let sink = Self::new(config);
        sink.clone().open().await?;
        Ok(sink)
    }

    /// Binds and connects both sockets, then starts the RTCP report task.
    pub async fn open(self: Arc<Self>) -> Result<(), SinkError> {
        *self.state.lock() = SocketState::Opening;

        match self.open_sockets().await {
            Ok(sockets) => {
                let rtcp_socket = sockets.rtcp.clone();
                *self.sockets.lock() = Some(sockets);
                *self.state.lock() = SocketState::Ready;

                let task = tokio::spawn(rtcp_report_loop(
                    Arc::downgrade(&self),
                    rtcp_socket,
                    self.config.rtcp_interval,
                ));
                *self.rtcp_task.lock() = Some(task);

                Ok(())
            }
            Err(e) => {
                *self.state.lock() = SocketState::Failed;
                Err(e)
            }
        }
    }

    async fn open_sockets(&self) -> Result<Sockets, SinkError> {
        let rtp_dest = self
            .resolve(self.config.rtp_port)
            .await?;
        let rtcp_dest = self
            .resolve(self.config.rtp_port.wrapping_add(1))
            .await?;

        let (rtp_local, rtcp_local) = if self.config.local_port > 0 {
            (
                format!("0.0.0.0:{}", self.config.local_port),
                format!("0.0.0.0:{}", self.config.local_port.wrapping_add(1)),
            )
        } else {
            ("0.0.0.0:0".to_string(), "0.0.0.0:0".to_string())
        };

        let rtp = UdpSocket::bind(&rtp_local).await?;
        rtp.connect(rtp_dest).await?;
        let rtcp = UdpSocket::bind(&rtcp_local).await?;
        rtcp.connect(rtcp_dest).await?;

        info!(
            local = %rtp.local_addr()?,
            rtp = %rtp_dest,
            rtcp = %rtcp_dest,
            ssrc = %format!("{:#010x}", self.config.ssrc),
            "RTP sink ready"
        );

        Ok(Sockets {
            rtp: Arc::new(rtp),
            rtcp: Arc::new(rtcp),
        })
    }

    async fn resolve(&self, port: u16) -> Result<SocketAddr, SinkError> {
        let target = format!("{}:{}", self.config.remote_host, port);
        let mut addrs = match lookup_host(&target).await {
            Ok(addrs) => addrs,
            Err(e) => return Err(SinkError::InvalidDestination(format!("{target}: {e}"))),
        };
        let first = addrs.next();
        drop(addrs);
        first.ok_or_else(|| SinkError::InvalidDestination(target))
    }

    /// Sends one RTP packet as a single datagram.
    ///
    /// Packets submitted before the sink is ready are dropped with a
    /// warning; socket errors are counted and swallowed.
    pub async fn send(&self, packet: &RtpPacket) {
        let socket = {
            let state = *self.state.lock();
            if state != SocketState::Ready {
                warn!(state = ?state, "dropping RTP packet, sink not ready");
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            match self.sockets.lock().as_ref() {
                Some(sockets) => sockets.rtp.clone(),
                None => {
                    self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        };

        let datagram = packet.to_bytes();
        match socket.send(&datagram).await {
            Ok(_) => {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.octets_sent
                    .fetch_add(packet.payload.len() as u32, Ordering::Relaxed);
            }
            Err(e) => {
                error!(error = %e, seq = packet.header.sequence_number, "failed to send RTP packet");
                self.send_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn state(&self) -> SocketState {
        *self.state.lock()
    }

    pub fn ssrc(&self) -> u32 {
        self.config.ssrc
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            octets_sent: self.octets_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
        }
    }

    /// Stops the report task and closes both sockets.
    pub async fn stop(&self) {
        if let Some(task) = self.rtcp_task.lock().take() {
            task.abort();
        }
        *self.sockets.lock() = None;
        *self.state.lock() = SocketState::Closed;
        debug!("RTP sink closed");
    }
}

/// Emits one sender report per interval while the sink is alive and has
/// sent at least one RTP packet.
async fn rtcp_report_loop(sink: Weak<RtpSink>, socket: Arc<UdpSocket>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so reports are spaced one
    // full interval apart.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(sink) = sink.upgrade() else { return };
        if sink.state() != SocketState::Ready {
            return;
        }

        let packet_count = sink.packets_sent.load(Ordering::Relaxed);
        if packet_count == 0 {
            continue;
        }
        let octet_count = sink.octets_sent.load(Ordering::Relaxed);

        let unix_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let report = SenderReport::at_wallclock(
            sink.config.ssrc,
            unix_seconds,
            RTP_CLOCK_RATE,
            packet_count,
            octet_count,
        );

        match socket.send(&report.to_bytes()).await {
            Ok(_) => {
                sink.reports_sent.fetch_add(1, Ordering::Relaxed);
                debug!(packet_count, octet_count, "sent RTCP sender report");
            }
            Err(e) => {
                warn!(error = %e, "failed to send RTCP sender report");
            }
        }
    }
}
