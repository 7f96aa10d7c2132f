//! Error types for the RTSP client library.

use std::fmt;

/// Errors that can occur in the RTSP client library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Connection**: [`Io`](Self::Io), [`InvalidUrl`](Self::InvalidUrl),
///   [`ChannelClosed`](Self::ChannelClosed).
/// - **Protocol**: [`Parse`](Self::Parse), for malformed RTSP responses
///   and SDP bodies.
/// - **Transport selection**: [`PortRangeExhausted`](Self::PortRangeExhausted).
/// - **Media**: [`RtpTooShort`](Self::RtpTooShort),
///   [`UnsupportedRtpVersion`](Self::UnsupportedRtpVersion),
///   [`Depacketize`](Self::Depacketize). These are recovered locally by
///   dropping the packet; they never end a session.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The RTSP URL could not be parsed or has no host.
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse an RTSP response, SDP body or numeric header.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// No even/odd UDP port pair in the configured range could be bound.
    #[error("no free UDP port pair in {start}-{end}")]
    PortRangeExhausted { start: u16, end: u16 },

    /// RTP datagram shorter than the payload offset its header declares.
    #[error("RTP packet too short: {len} bytes, payload starts at {offset}")]
    RtpTooShort { len: usize, offset: usize },

    /// RTP version field other than 2 (RFC 3550 §5.1).
    #[error("unsupported RTP version {0}")]
    UnsupportedRtpVersion(u8),

    /// Malformed or truncated H.264 payload (RFC 6184).
    #[error("H.264 depacketization failed: {0}")]
    Depacketize(String),

    /// The RTSP connection was closed before a request could be written.
    #[error("RTSP connection closed")]
    ChannelClosed,
}

/// Specific kind of parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no status line).
    EmptyResponse,
    /// Status line did not have the expected `RTSP/1.0 Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// A header value (`CSeq`, `Content-Length`, ...) was not a valid number.
    InvalidNumber,
    /// An SDP line was not of the form `<type>=<value>`.
    InvalidSdpLine,
    /// Response head or body longer than the reader accepts.
    MessageTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidNumber => write!(f, "invalid numeric header value"),
            Self::InvalidSdpLine => write!(f, "invalid SDP line"),
            Self::MessageTooLarge => write!(f, "message too large"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
