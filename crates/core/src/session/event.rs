use crate::protocol::RtspResponse;

/// Input to the session engine.
///
/// Every producer (the TCP reader, UDP receivers, the keepalive timer and
/// the public commands) posts into one queue consumed by the engine thread,
/// so session fields are only ever touched from that thread.
#[derive(Debug)]
pub enum Event {
    /// A complete RTSP response from the server.
    Message(RtspResponse),
    /// An RTP/RTCP chunk: interleaved channel id under TCP, local port
    /// under UDP.
    Data { channel: u16, payload: Vec<u8> },
    Command(Command),
    KeepaliveTick,
    /// The control connection went away.
    Closed(&'static str),
}

/// User commands routed through the engine queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
}
