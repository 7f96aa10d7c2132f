use std::net::IpAddr;

use crate::error::Result;
use crate::transport::MediaPaths;

/// How RTP is carried between server and client (RFC 2326 §10.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Interleaved in the RTSP TCP connection (`$` framing).
    #[default]
    Tcp,
    /// UDP unicast to a locally bound port pair.
    Udp,
    /// UDP multicast group announced by the server.
    Multicast,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransportMode::Tcp => "tcp",
            TransportMode::Udp => "udp",
            TransportMode::Multicast => "multicast",
        })
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportMode::Tcp),
            "udp" => Ok(TransportMode::Udp),
            "multicast" => Ok(TransportMode::Multicast),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// Client-side transport choice sent with SETUP.
///
/// `data_channel`/`control_channel` are the interleaved channel ids under
/// TCP and the local RTP/RTCP ports under UDP. Multicast starts with `0`
/// placeholders that the SETUP reply overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDescriptor {
    pub mode: TransportMode,
    pub data_channel: u16,
    pub control_channel: u16,
}

impl TransportDescriptor {
    /// Build the descriptor for `mode`, binding a UDP port pair when needed.
    pub fn select(mode: TransportMode, paths: &mut dyn MediaPaths) -> Result<Self> {
        let (data_channel, control_channel) = match mode {
            TransportMode::Tcp => (0, 1),
            TransportMode::Udp => paths.bind_unicast()?,
            TransportMode::Multicast => (0, 0),
        };
        tracing::debug!(%mode, data_channel, control_channel, "transport selected");
        Ok(Self {
            mode,
            data_channel,
            control_channel,
        })
    }

    /// `Transport` header value for the SETUP request.
    ///
    /// ```
    /// use rtsp::session::transport::{TransportDescriptor, TransportMode};
    ///
    /// let t = TransportDescriptor { mode: TransportMode::Udp, data_channel: 50000, control_channel: 50001 };
    /// assert_eq!(t.header(), "RTP/AVP;unicast;client_port=50000-50001");
    /// ```
    pub fn header(&self) -> String {
        match self.mode {
            TransportMode::Tcp => format!(
                "RTP/AVP/TCP;unicast;interleaved={}-{}",
                self.data_channel, self.control_channel
            ),
            TransportMode::Udp => format!(
                "RTP/AVP;unicast;client_port={}-{}",
                self.data_channel, self.control_channel
            ),
            TransportMode::Multicast => "RTP/AVP;multicast".to_string(),
        }
    }
}

/// A parsed `Transport` header (RFC 2326 §12.39), as returned by the
/// server in the SETUP reply.
///
/// ## Wire format examples
///
/// ```text
/// RTP/AVP/TCP;unicast;interleaved=0-1
/// RTP/AVP;unicast;client_port=50000-50001;server_port=6970-6971;ssrc=1A2B3C4D
/// RTP/AVP;multicast;destination=239.0.0.1;port=5000-5001;ttl=16
/// ```
///
/// Unknown parameters are ignored; only the first transport spec of a
/// comma-separated list is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHeader {
    /// `RTP/AVP` or `RTP/AVP/TCP`.
    pub protocol: String,
    pub multicast: bool,
    pub destination: Option<IpAddr>,
    /// Multicast `port=` pair.
    pub port: Option<(u16, u16)>,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    pub interleaved: Option<(u16, u16)>,
}

impl TransportHeader {
    /// Parse a `Transport` header value.
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001");
    /// assert_eq!(th.client_port, Some((8000, 8001)));
    /// assert!(!th.multicast);
    /// ```
    pub fn parse(header: &str) -> Self {
        let spec = header.split(',').next().unwrap_or_default();
        let mut parts = spec.split(';').map(str::trim);
        let mut th = TransportHeader {
            protocol: parts.next().unwrap_or_default().to_string(),
            ..Default::default()
        };

        for part in parts {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key.to_ascii_lowercase().as_str() {
                "multicast" => th.multicast = true,
                "unicast" => th.multicast = false,
                "destination" => th.destination = value.parse().ok(),
                "port" => th.port = parse_pair(value),
                "client_port" => th.client_port = parse_pair(value),
                "server_port" => th.server_port = parse_pair(value),
                "interleaved" => th.interleaved = parse_pair(value),
                _ => {}
            }
        }
        th
    }
}

/// `a-b`, or a single `a` meaning `a-(a+1)`.
fn parse_pair(value: &str) -> Option<(u16, u16)> {
    match value.split_once('-') {
        Some((a, b)) => Some((a.trim().parse().ok()?, b.trim().parse().ok()?)),
        None => {
            let a: u16 = value.trim().parse().ok()?;
            Some((a, a.checked_add(1)?))
        }
    }
}
