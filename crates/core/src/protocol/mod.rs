//! Client side of the RTSP signaling protocol (RFC 2326).
//!
//! Requests are built here and serialized with a `CSeq` chosen by the
//! message channel. Replies come back as [`RtspResponse`]; a DESCRIBE body is
//! read with [`SessionDescription`] and a `WWW-Authenticate` challenge with
//! [`AuthChallenge`].
//!
//! A typical request on the wire:
//!
//! ```text
//! SETUP rtsp://camera/stream/trackID=1 RTSP/1.0\r\n
//! CSeq: 3\r\n
//! Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n
//! \r\n
//! ```
//!
//! | Method | RFC 2326 | Sent when |
//! |--------|----------|-----------|
//! | OPTIONS | §10.1 | On connect, then periodically as keepalive |
//! | DESCRIBE | §10.2 | After the first OPTIONS reply, again after a 401 |
//! | SETUP | §10.4 | After a usable SDP answer |
//! | PLAY | §10.5 | After SETUP, and on resume |
//! | PAUSE | §10.6 | On request |
//! | TEARDOWN | §10.7 | On stop |

pub mod auth;
pub mod request;
pub mod response;
pub mod sdp;

pub use auth::{AuthChallenge, Credentials};
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
pub use sdp::SessionDescription;
