//! The base UDP layer of the discv5 service.
//!
//! `Discv5Service` opens a UDP socket and handles packet encode/decode on
//! top of it. This is the external transport collaborator (`start`,
//! `stop`, `send`, the `packet` event) made concrete.

use crate::config::MAX_PACKET_SIZE;
use crate::packet::Packet;
use core::pin::Pin;
use futures::Stream;
use log::debug;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use tokio::net::UdpSocket;

/// The UDP transport. Outbound packets are queued and drained
/// opportunistically on every poll; inbound packets are decoded and
/// yielded as a `Stream`. `stop()` is simply dropping this value — a bare
/// `UdpSocket` owns no background task to join.
pub struct Discv5Service {
    socket: UdpSocket,
    recv_buffer: Box<[u8; MAX_PACKET_SIZE]>,
    send_queue: VecDeque<(SocketAddr, Packet)>,
}

impl Discv5Service {
    /// Binds the UDP socket. Fails only if the bind itself fails.
    pub async fn new(socket_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(socket_addr).await?;
        Ok(Discv5Service {
            socket,
            recv_buffer: Box::new([0; MAX_PACKET_SIZE]),
            send_queue: VecDeque::new(),
        })
    }

    /// Queues a packet for the given destination. Best-effort: the send
    /// is attempted on the next poll, synchronously, with no ack from the
    /// transport and no guarantee of delivery.
    pub fn send(&mut self, to: SocketAddr, packet: Packet) {
        self.send_queue.push_back((to, packet));
    }
}

impl Stream for Discv5Service {
    type Item = (SocketAddr, Packet);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let service = self.get_mut();

        while let Some((dst, packet)) = service.send_queue.front() {
            let encoded = packet.encode();
            match service.socket.poll_send_to(cx, &encoded, *dst) {
                Poll::Ready(Ok(_)) => {
                    service.send_queue.pop_front();
                }
                Poll::Pending => break,
                Poll::Ready(Err(e)) => {
                    debug!("dropping packet to {}: {}", dst, e);
                    service.send_queue.pop_front();
                }
            }
        }

        loop {
            let mut buf = tokio::io::ReadBuf::new(service.recv_buffer.as_mut());
            match service.socket.poll_recv_from(cx, &mut buf) {
                Poll::Ready(Ok(src)) => {
                    match Packet::decode(buf.filled()) {
                        Ok(packet) => return Poll::Ready(Some((src, packet))),
                        Err(e) => debug!("could not decode packet from {}: {:?}", src, e),
                    }
                }
                Poll::Ready(Err(e)) => {
                    debug!("udp recv error: {}", e);
                    return Poll::Pending;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
