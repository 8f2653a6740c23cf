//! Receiving end of the push transport.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::FlycamError;
use crate::transport::chunk::PacketAssembler;

/// Largest datagram the receiver accepts.
const MAX_DATAGRAM: usize = 65_536;

/// Binds a UDP socket and yields complete packets, newest first.
pub struct PacketReceiver {
    socket: UdpSocket,
    assembler: PacketAssembler,
    buf: Vec<u8>,
}

impl PacketReceiver {
    pub async fn bind(addr: SocketAddr) -> Result<Self, FlycamError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            assembler: PacketAssembler::new(),
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FlycamError> {
        Ok(self.socket.local_addr()?)
    }

    /// Packets given up on because a newer one arrived before completion.
    pub fn abandoned(&self) -> u64 {
        self.assembler.abandoned()
    }

    /// Times the sender was seen to restart its sequence.
    pub fn restarts(&self) -> u64 {
        self.assembler.restarts()
    }

    /// Wait for the next complete packet.
    ///
    /// Malformed datagrams are skipped.
    pub async fn recv(&mut self) -> Result<Vec<u8>, FlycamError> {
        loop {
            let (n, from) = self.socket.recv_from(&mut self.buf).await?;
            match self.assembler.push(&self.buf[..n]) {
                Ok(Some(packet)) => return Ok(packet),
                Ok(None) => {}
                Err(e) => debug!(%from, "skipping datagram: {e}"),
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::chunk::{split_packet, write_datagram};
    use std::time::Duration;

    async fn send(socket: &UdpSocket, to: SocketAddr, packet: &[u8], sequence: u32, mtu: usize) {
        let mut scratch = Vec::new();
        for (header, data) in split_packet(packet, sequence, mtu).unwrap() {
            socket
                .send_to(write_datagram(&mut scratch, &header, data), to)
                .await
                .unwrap();
        }
    }

    async fn next(rx: &mut PacketReceiver) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .unwrap()
    }

    #[tokio::test]
    async fn skips_garbage_and_follows_restart() {
        let mut rx = PacketReceiver::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let to = rx.local_addr().unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        tx.send_to(&[1, 2, 3], to).await.unwrap();
        send(&tx, to, b"before", 5000, 1400).await;
        assert_eq!(next(&mut rx).await, b"before");

        send(&tx, to, b"after", 0, 1400).await;
        assert_eq!(next(&mut rx).await, b"after");
        assert_eq!(rx.restarts(), 1);
    }

    #[tokio::test]
    async fn partial_packet_is_abandoned_for_newer() {
        let mut rx = PacketReceiver::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let to = rx.local_addr().unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut scratch = Vec::new();
        let stale = vec![1u8; 300];
        let (header, data) = split_packet(&stale, 1, 112).unwrap().next().unwrap();
        tx.send_to(write_datagram(&mut scratch, &header, data), to)
            .await
            .unwrap();
        send(&tx, to, &[2u8; 300], 2, 112).await;

        assert_eq!(next(&mut rx).await, vec![2u8; 300]);
        assert_eq!(rx.abandoned(), 1);
    }
}
