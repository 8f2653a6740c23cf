//! Latest-wins push delivery.
//!
//! [`PushSocket::submit`] never blocks and never queues: a packet that has
//! not been picked up by the time the next one arrives is replaced. A
//! tokio task drains the slot onto a UDP socket, splitting each packet
//! into MTU-sized datagrams (see [`crate::transport::chunk`]).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::FlycamError;
use crate::transport::chunk::{chunk_count, split_packet, write_datagram};

/// Maximum transmission unit minus IP (20) + UDP (8) headers.
pub const DEFAULT_MTU: usize = 1400;

// ── PushSocket ───────────────────────────────────────────────────

/// A fire-and-forget, drop-on-overflow message channel.
pub trait PushSocket: Send + Sync {
    /// Hand over a complete packet. Must return immediately; failures are
    /// absorbed by the socket.
    fn submit(&self, packet: &[u8]);
}

impl<T: PushSocket + ?Sized> PushSocket for Arc<T> {
    fn submit(&self, packet: &[u8]) {
        (**self).submit(packet)
    }
}

// ── TransportStats ───────────────────────────────────────────────

/// Counters shared between the submitting thread and the drain task.
#[derive(Debug, Default)]
pub struct TransportStats {
    submitted: AtomicU64,
    replaced: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportSnapshot {
    /// Packets handed to `submit`.
    pub submitted: u64,
    /// Packets overwritten before they were sent.
    pub replaced: u64,
    /// Packets fully written to the socket.
    pub sent: u64,
    /// Packets dropped on a socket error.
    pub failed: u64,
    /// Datagram bytes written, chunk headers included.
    pub bytes_sent: u64,
}

impl TransportStats {
    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

// ── LatestSender ─────────────────────────────────────────────────

struct Shared {
    slot: Mutex<Option<Bytes>>,
    notify: Notify,
    closed: AtomicBool,
    stats: TransportStats,
}

/// UDP push socket with a single latest-wins slot.
pub struct LatestSender {
    shared: Arc<Shared>,
    remote: SocketAddr,
    task: Option<JoinHandle<()>>,
}

impl LatestSender {
    /// Bind `bind_addr` and start draining towards `remote`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn bind(
        bind_addr: SocketAddr,
        remote: SocketAddr,
        mtu: usize,
    ) -> Result<Self, FlycamError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Self::spawn(socket, remote, mtu)
    }

    /// Wrap an already-bound socket and spawn the drain task.
    pub fn spawn(socket: UdpSocket, remote: SocketAddr, mtu: usize) -> Result<Self, FlycamError> {
        // Rejects an MTU too small for the chunk header before anything runs.
        chunk_count(0, mtu)?;

        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            stats: TransportStats::default(),
        });
        let task = tokio::spawn(drain(Arc::clone(&shared), socket, remote, mtu));
        Ok(Self {
            shared,
            remote,
            task: Some(task),
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn stats(&self) -> TransportSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stop the drain task. A packet still in the slot is discarded.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }

    /// Close and wait for the drain task to exit.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl PushSocket for LatestSender {
    fn submit(&self, packet: &[u8]) {
        let stats = &self.shared.stats;
        stats.submitted.fetch_add(1, Ordering::Relaxed);
        let previous = self.shared.slot.lock().replace(Bytes::copy_from_slice(packet));
        if previous.is_some() {
            stats.replaced.fetch_add(1, Ordering::Relaxed);
            trace!(remote = %self.remote, "unsent packet replaced");
        }
        self.shared.notify.notify_one();
    }
}

impl Drop for LatestSender {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drain(shared: Arc<Shared>, socket: UdpSocket, remote: SocketAddr, mtu: usize) {
    let mut sequence: u32 = 0;
    let mut scratch = Vec::with_capacity(mtu);

    loop {
        shared.notify.notified().await;
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        let Some(packet) = shared.slot.lock().take() else {
            continue;
        };

        match send_packet(&socket, remote, mtu, sequence, &packet, &mut scratch).await {
            Ok(written) => {
                shared.stats.sent.fetch_add(1, Ordering::Relaxed);
                shared.stats.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
            }
            Err(e) => {
                shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                debug!(%remote, sequence, "packet dropped: {e}");
            }
        }
        sequence = sequence.wrapping_add(1);
    }
    debug!(%remote, "push drain stopped");
}

async fn send_packet(
    socket: &UdpSocket,
    remote: SocketAddr,
    mtu: usize,
    sequence: u32,
    packet: &[u8],
    scratch: &mut Vec<u8>,
) -> Result<usize, FlycamError> {
    let mut written = 0;
    for (header, data) in split_packet(packet, sequence, mtu)? {
        let datagram = write_datagram(scratch, &header, data);
        written += socket.send_to(datagram, remote).await?;
    }
    Ok(written)
}

// ── MemorySocket ─────────────────────────────────────────────────

/// In-process push socket that keeps only the newest packet.
///
/// Useful for dry runs and for observing what the pipeline emits.
#[derive(Debug, Default)]
pub struct MemorySocket {
    latest: Mutex<Option<Vec<u8>>>,
    submitted: AtomicU64,
    replaced: AtomicU64,
}

impl MemorySocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the newest packet, leaving the slot empty.
    pub fn take_latest(&self) -> Option<Vec<u8>> {
        self.latest.lock().take()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Packets overwritten without ever being taken.
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }
}

impl PushSocket for MemorySocket {
    fn submit(&self, packet: &[u8]) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.latest.lock();
        match slot.as_mut() {
            Some(buf) => {
                self.replaced.fetch_add(1, Ordering::Relaxed);
                buf.clear();
                buf.extend_from_slice(packet);
            }
            None => *slot = Some(packet.to_vec()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
