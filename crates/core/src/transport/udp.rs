use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::MediaPaths;
use crate::error::{Result, RtspError};
use crate::session::Event;

/// Default local port range for unicast RTP/RTCP.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 50000..=50020;

/// Receive poll interval; bounds how long [`MediaPaths::close`] waits.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 65_536;

/// UDP receive paths for RTP and RTCP.
///
/// Each bound socket gets a receiver thread that posts
/// [`Event::Data`] tagged with the socket's local port, so the demuxer can
/// tell RTP from RTCP the same way it tells interleaved channels apart.
/// Receivers poll a shared `running` flag between short read timeouts.
pub struct UdpMediaPaths {
    port_range: RangeInclusive<u16>,
    events: Sender<Event>,
    running: Arc<AtomicBool>,
    receivers: Vec<JoinHandle<()>>,
}

impl UdpMediaPaths {
    pub fn new(port_range: RangeInclusive<u16>, events: Sender<Event>) -> Self {
        Self {
            port_range,
            events,
            running: Arc::new(AtomicBool::new(true)),
            receivers: Vec::new(),
        }
    }

    /// Even-numbered RTP ports whose RTCP port (`+1`) also lies in range,
    /// rotated to start at a random pair.
    fn candidate_pairs(&self) -> Vec<(u16, u16)> {
        let start = *self.port_range.start();
        let end = *self.port_range.end();
        let first = start.saturating_add(start % 2);

        let mut pairs: Vec<(u16, u16)> = (first..end)
            .step_by(2)
            .map(|rtp| (rtp, rtp + 1))
            .collect();
        if !pairs.is_empty() {
            let offset = rand::random::<u32>() as usize % pairs.len();
            pairs.rotate_left(offset);
        }
        pairs
    }

    fn spawn_receiver(&mut self, socket: UdpSocket) -> Result<()> {
        let port = socket.local_addr()?.port();
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        let running = self.running.clone();
        let events = self.events.clone();
        let handle = thread::spawn(move || receive_loop(socket, port, events, running));
        self.receivers.push(handle);
        Ok(())
    }
}

impl MediaPaths for UdpMediaPaths {
    fn bind_unicast(&mut self) -> Result<(u16, u16)> {
        for (rtp_port, rtcp_port) in self.candidate_pairs() {
            let Ok(rtp) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, rtp_port)) else {
                continue;
            };
            let Ok(rtcp) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, rtcp_port)) else {
                continue;
            };

            self.spawn_receiver(rtp)?;
            self.spawn_receiver(rtcp)?;
            tracing::info!(rtp_port, rtcp_port, "UDP port pair bound");
            return Ok((rtp_port, rtcp_port));
        }

        Err(RtspError::PortRangeExhausted {
            start: *self.port_range.start(),
            end: *self.port_range.end(),
        })
    }

    fn join_multicast(&mut self, group: IpAddr, data_port: u16, control_port: u16) -> Result<()> {
        for port in [data_port, control_port] {
            let socket = multicast_socket(group, port)?;
            self.spawn_receiver(socket)?;
        }
        tracing::info!(%group, data_port, control_port, "joined multicast group");
        Ok(())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let count = self.receivers.len();
        for handle in self.receivers.drain(..) {
            let _ = handle.join();
        }
        if count > 0 {
            tracing::debug!(receivers = count, "UDP receivers stopped");
        }
    }
}

impl Drop for UdpMediaPaths {
    fn drop(&mut self) {
        self.close();
    }
}

/// Bind `port` with `SO_REUSEADDR` and join `group` on the default interface.
fn multicast_socket(group: IpAddr, port: u16) -> Result<UdpSocket> {
    let domain = match group {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    match group {
        IpAddr::V4(addr) => {
            let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            socket.bind(&SockAddr::from(local))?;
            socket.join_multicast_v4(&addr, &Ipv4Addr::UNSPECIFIED)?;
        }
        IpAddr::V6(addr) => {
            let local = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
            socket.bind(&SockAddr::from(local))?;
            socket.join_multicast_v6(&addr, 0)?;
        }
    }

    Ok(socket.into())
}

fn receive_loop(socket: UdpSocket, port: u16, events: Sender<Event>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                tracing::trace!(port, %from, len, "datagram");
                let event = Event::Data {
                    channel: port,
                    payload: buf[..len].to_vec(),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(port, error = %e, "UDP receive error");
                }
                break;
            }
        }
    }
    tracing::debug!(port, "UDP receiver exited");
}
