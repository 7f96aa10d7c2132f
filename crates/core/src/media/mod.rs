//! Media reception and RTP depacketization.
//!
//! Received RTP packets flow through three stages:
//!
//! 1. [`rtp::RtpPacket`] parses the fixed header, CSRCs, extension and
//!    padding (RFC 3550 §5.1) and yields the payload slice.
//! 2. [`demux::RtpDemuxer`] routes by channel (RTP vs RTCP), filters on the
//!    negotiated payload type and tracks sequence numbers.
//! 3. The codec depacketizer reassembles payloads into NAL groups, which are
//!    handed to the application through [`MediaSink`].
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Status |
//! |-------|--------|-----|--------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | Implemented |
//! | Others | - | - | Reported once, discarded |

pub mod demux;
pub mod h264;
pub mod rtp;

/// Receiver of decoded video output.
///
/// NAL units are raw, without Annex-B start codes. `on_sps_pps` is called
/// once, before the first `on_nal_group`, when the session description
/// carries `sprop-parameter-sets`.
///
/// Callbacks run on the client's engine thread; long work should be handed
/// off to another thread.
pub trait MediaSink: Send {
    fn on_sps_pps(&mut self, sps: &[u8], pps: &[u8]);

    /// One access unit: every NAL unit received up to and including the
    /// packet with the RTP marker bit set.
    fn on_nal_group(&mut self, nals: Vec<Vec<u8>>);
}

impl<S: MediaSink + ?Sized> MediaSink for Box<S> {
    fn on_sps_pps(&mut self, sps: &[u8], pps: &[u8]) {
        (**self).on_sps_pps(sps, pps);
    }

    fn on_nal_group(&mut self, nals: Vec<Vec<u8>>) {
        (**self).on_nal_group(nals);
    }
}
