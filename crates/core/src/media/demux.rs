use super::MediaSink;
use super::h264::H264Depacketizer;
use super::rtp::RtpPacket;

/// Packet counters kept by [`RtpDemuxer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// RTP packets on the data channel, valid or not.
    pub received: u64,
    /// RTCP packets, foreign payload types and unsupported codecs.
    pub discarded: u64,
    /// Packets that failed header parsing or depacketization.
    pub malformed: u64,
    /// Sequence numbers skipped between consecutive packets.
    pub lost: u64,
}

/// Routes received chunks to the depacketizer.
///
/// Chunks arrive tagged with the channel they came in on: the interleaved
/// channel id under TCP, the local port under UDP. The control channel
/// carries RTCP, which is acknowledged and discarded. Data-channel packets
/// whose payload type differs from the negotiated one are dropped; H.264
/// payloads go through [`H264Depacketizer`] and completed access units are
/// delivered to the [`MediaSink`].
pub struct RtpDemuxer {
    sink: Box<dyn MediaSink>,
    depacketizer: H264Depacketizer,
    data_channel: u16,
    control_channel: u16,
    payload_type: Option<u8>,
    codec: String,
    codec_reported: bool,
    last_sequence: Option<u16>,
    stats: DemuxStats,
}

impl RtpDemuxer {
    pub fn new(sink: Box<dyn MediaSink>) -> Self {
        Self {
            sink,
            depacketizer: H264Depacketizer::new(),
            data_channel: 0,
            control_channel: 1,
            payload_type: None,
            codec: String::new(),
            codec_reported: false,
            last_sequence: None,
            stats: DemuxStats::default(),
        }
    }

    /// Record the negotiated payload type and codec name.
    pub fn set_stream(&mut self, payload_type: u8, codec: &str) {
        self.payload_type = Some(payload_type);
        self.codec = codec.to_string();
        self.codec_reported = false;
    }

    pub fn set_channels(&mut self, data_channel: u16, control_channel: u16) {
        self.data_channel = data_channel;
        self.control_channel = control_channel;
        self.last_sequence = None;
        self.depacketizer.reset();
    }

    pub fn channels(&self) -> (u16, u16) {
        (self.data_channel, self.control_channel)
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Forward decoded parameter sets to the sink.
    pub fn emit_parameter_sets(&mut self, sps: &[u8], pps: &[u8]) {
        tracing::debug!(sps_len = sps.len(), pps_len = pps.len(), "parameter sets");
        self.sink.on_sps_pps(sps, pps);
    }

    /// Handle one chunk received on `channel`.
    pub fn handle(&mut self, channel: u16, data: &[u8]) {
        if channel == self.control_channel {
            tracing::trace!(channel, len = data.len(), "RTCP received, discarding");
            self.stats.discarded += 1;
            return;
        }
        if channel != self.data_channel {
            tracing::trace!(channel, len = data.len(), "chunk on unknown channel");
            self.stats.discarded += 1;
            return;
        }

        self.stats.received += 1;
        let packet = match RtpPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(error = %e, len = data.len(), "malformed RTP packet");
                self.stats.malformed += 1;
                return;
            }
        };

        if Some(packet.payload_type) != self.payload_type {
            tracing::trace!(
                payload_type = packet.payload_type,
                expected = ?self.payload_type,
                "foreign payload type, discarding"
            );
            self.stats.discarded += 1;
            return;
        }

        self.track_sequence(packet.sequence_number);

        if self.codec != "H264" {
            if !self.codec_reported {
                tracing::warn!(codec = %self.codec, "unsupported codec, discarding payloads");
                self.codec_reported = true;
            }
            self.stats.discarded += 1;
            return;
        }

        let dropped = self.depacketizer.dropped();
        if let Some(nals) = self.depacketizer.process(packet.payload(), packet.marker) {
            tracing::trace!(
                seq = packet.sequence_number,
                timestamp = packet.timestamp,
                nal_count = nals.len(),
                "NAL group"
            );
            self.sink.on_nal_group(nals);
        }
        if self.depacketizer.dropped() != dropped {
            self.stats.malformed += 1;
        }
    }

    fn track_sequence(&mut self, sequence: u16) {
        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                let gap = sequence.wrapping_sub(expected);
                if gap < 0x8000 {
                    self.stats.lost += u64::from(gap);
                }
                tracing::debug!(
                    expected,
                    got = sequence,
                    lost = self.stats.lost,
                    "sequence discontinuity, resetting depacketizer"
                );
                self.depacketizer.reset();
            }
        }
        self.last_sequence = Some(sequence);
    }
}

impl std::fmt::Debug for RtpDemuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpDemuxer")
            .field("data_channel", &self.data_channel)
            .field("control_channel", &self.control_channel)
            .field("payload_type", &self.payload_type)
            .field("codec", &self.codec)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::media::rtp::build_packet;

    /// Sink that records everything it receives.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub parameter_sets: Arc<Mutex<Vec<(Vec<u8>, Vec<u8>)>>>,
        pub groups: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
    }

    impl MediaSink for RecordingSink {
        fn on_sps_pps(&mut self, sps: &[u8], pps: &[u8]) {
            self.parameter_sets.lock().push((sps.to_vec(), pps.to_vec()));
        }

        fn on_nal_group(&mut self, nals: Vec<Vec<u8>>) {
            self.groups.lock().push(nals);
        }
    }

    fn demuxer() -> (RtpDemuxer, RecordingSink) {
        let sink = RecordingSink::default();
        let mut demux = RtpDemuxer::new(Box::new(sink.clone()));
        demux.set_stream(96, "H264");
        demux.set_channels(0, 1);
        (demux, sink)
    }

    #[test]
    fn delivers_access_unit_on_marker() {
        let (mut demux, sink) = demuxer();
        demux.handle(0, &build_packet(96, 10, false, &[], None, &[0x67, 0x42]));
        assert!(sink.groups.lock().is_empty());
        demux.handle(0, &build_packet(96, 11, true, &[], None, &[0x65, 0x88]));
        assert_eq!(
            *sink.groups.lock(),
            vec![vec![vec![0x67, 0x42], vec![0x65, 0x88]]]
        );
        assert_eq!(demux.stats().received, 2);
    }

    #[test]
    fn rtcp_discarded() {
        let (mut demux, sink) = demuxer();
        demux.handle(1, &[0x80, 0xC8, 0x00, 0x06]);
        assert!(sink.groups.lock().is_empty());
        assert_eq!(demux.stats().discarded, 1);
        assert_eq!(demux.stats().received, 0);
    }

    #[test]
    fn foreign_payload_type_discarded() {
        let (mut demux, sink) = demuxer();
        demux.handle(0, &build_packet(0, 1, true, &[], None, &[0x65]));
        assert!(sink.groups.lock().is_empty());
        assert_eq!(demux.stats().discarded, 1);
    }

    #[test]
    fn unsupported_codec_discarded() {
        let sink = RecordingSink::default();
        let mut demux = RtpDemuxer::new(Box::new(sink.clone()));
        demux.set_stream(26, "JPEG");
        assert!(!demux.codec_reported);

        demux.handle(0, &build_packet(26, 0, true, &[], None, &[0, 0, 0, 0]));
        assert!(demux.codec_reported);
        for seq in 1..3 {
            demux.handle(0, &build_packet(26, seq, true, &[], None, &[0, 0, 0, 0]));
        }
        assert!(demux.codec_reported);
        assert!(sink.groups.lock().is_empty());
        assert_eq!(demux.stats().discarded, 3);

        // Renegotiating clears the report and H.264 flows again.
        demux.set_stream(96, "H264");
        assert!(!demux.codec_reported);
        demux.handle(0, &build_packet(96, 3, true, &[], None, &[0x65, 0x01]));
        assert!(!demux.codec_reported);
        assert_eq!(*sink.groups.lock(), vec![vec![vec![0x65u8, 0x01]]]);
        assert_eq!(demux.stats().discarded, 3);
    }

    #[test]
    fn short_packet_counted_malformed() {
        let (mut demux, sink) = demuxer();
        demux.handle(0, &[0x80, 0x60, 0x00]);
        assert!(sink.groups.lock().is_empty());
        assert_eq!(demux.stats().malformed, 1);
    }

    #[test]
    fn undepacketizable_payload_counted_malformed() {
        let (mut demux, sink) = demuxer();
        demux.handle(0, &build_packet(96, 1, true, &[], None, &[0x7C]));
        assert!(sink.groups.lock().is_empty());
        assert_eq!(demux.stats().malformed, 1);
    }

    #[test]
    fn sequence_gap_drops_partial_frame() {
        let (mut demux, sink) = demuxer();
        demux.handle(0, &build_packet(96, 100, false, &[], None, &[0x41, 1]));
        // 101 lost
        demux.handle(0, &build_packet(96, 102, true, &[], None, &[0x41, 3]));
        assert_eq!(*sink.groups.lock(), vec![vec![vec![0x41, 3]]]);
        assert_eq!(demux.stats().lost, 1);
    }

    #[test]
    fn sequence_wraps_without_loss() {
        let (mut demux, sink) = demuxer();
        demux.handle(0, &build_packet(96, u16::MAX, false, &[], None, &[0x41, 1]));
        demux.handle(0, &build_packet(96, 0, true, &[], None, &[0x41, 2]));
        assert_eq!(sink.groups.lock().len(), 1);
        assert_eq!(demux.stats().lost, 0);
    }

    #[test]
    fn parameter_sets_forwarded() {
        let (mut demux, sink) = demuxer();
        demux.emit_parameter_sets(&[0x67], &[0x68]);
        assert_eq!(*sink.parameter_sets.lock(), vec![(vec![0x67], vec![0x68])]);
    }
}
