//! Network transport layer for RTSP signaling and RTP media reception.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling and, in
//!   interleaved mode (RFC 2326 §10.12), RTP/RTCP frames with `$` framing:
//!
//!   ```text
//!   '$' (0x24) | channel (u8) | length (u16 BE) | RTP/RTCP packet
//!   ```
//!
//! - **UDP** ([`udp`]): carries RTP/RTCP in unicast or multicast mode, one
//!   socket per port with its own receiver thread.
//!
//! The session engine only sees the [`MessageChannel`] and [`MediaPaths`]
//! traits; both deliver what they receive as [`Event`](crate::session::Event)s
//! on the engine queue.

pub mod tcp;
pub mod udp;

use std::net::IpAddr;

use crate::error::Result;
use crate::protocol::RtspRequest;

pub use tcp::TcpMessageChannel;
pub use udp::UdpMediaPaths;

/// Outgoing side of the RTSP control connection.
pub trait MessageChannel: Send {
    /// Assign the next `CSeq`, write the request and return the `CSeq` used.
    fn send(&mut self, request: RtspRequest) -> Result<u32>;

    /// Shut the connection down. Safe to call more than once.
    fn close(&mut self);
}

/// Local UDP receive paths for RTP and RTCP.
pub trait MediaPaths: Send {
    /// Bind a unicast port pair and start receiving; returns `(rtp, rtcp)`.
    fn bind_unicast(&mut self) -> Result<(u16, u16)>;

    /// Join `group` and receive on the given RTP/RTCP ports.
    fn join_multicast(&mut self, group: IpAddr, data_port: u16, control_port: u16) -> Result<()>;

    /// Stop all receivers and release the sockets. Safe to call more than once.
    fn close(&mut self);
}
