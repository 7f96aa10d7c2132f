use crate::error::{Result, RtspError};

/// Size of the RTP fixed header (RFC 3550 §5.1).
pub const FIXED_HEADER_LEN: usize = 12;

/// A received RTP packet, borrowing the datagram (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                    CSRC list (CC × 32 bits)                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      extension id (X=1)       |   extension length (words)    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The payload starts at `12 + 4×CC + (X ? 4 + 4×ext_len : 0)`. Trailing
/// padding (P=1, count in the final octet) is excluded from
/// [`payload`](Self::payload).
#[derive(Debug, Clone, Copy)]
pub struct RtpPacket<'a> {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence_number: u16,
    /// Media clock, 90 kHz for video.
    pub timestamp: u32,
    pub ssrc: u32,
    /// Header extension `(id, data)` when X=1.
    pub extension_header: Option<(u16, &'a [u8])>,
    payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse a datagram, rejecting anything shorter than its declared
    /// payload offset.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(RtspError::RtpTooShort {
                len: data.len(),
                offset: FIXED_HEADER_LEN,
            });
        }

        let version = data[0] >> 6;
        if version != 2 {
            return Err(RtspError::UnsupportedRtpVersion(version));
        }
        let padding = (data[0] >> 5) & 0x01 == 1;
        let extension = (data[0] >> 4) & 0x01 == 1;
        let csrc_count = data[0] & 0x0f;
        let marker = data[1] >> 7 == 1;
        let payload_type = data[1] & 0x7f;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = FIXED_HEADER_LEN + 4 * usize::from(csrc_count);
        let mut extension_header = None;
        if extension {
            if data.len() < offset + 4 {
                return Err(RtspError::RtpTooShort {
                    len: data.len(),
                    offset: offset + 4,
                });
            }
            let id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
            let ext_start = offset + 4;
            offset = ext_start + 4 * usize::from(words);
            if data.len() < offset {
                return Err(RtspError::RtpTooShort {
                    len: data.len(),
                    offset,
                });
            }
            extension_header = Some((id, &data[ext_start..offset]));
        }
        if data.len() < offset {
            return Err(RtspError::RtpTooShort {
                len: data.len(),
                offset,
            });
        }

        let mut end = data.len();
        if padding {
            let pad = usize::from(data[end - 1]);
            if pad == 0 || end - offset < pad {
                return Err(RtspError::RtpTooShort {
                    len: data.len(),
                    offset: offset + pad,
                });
            }
            end -= pad;
        }

        Ok(RtpPacket {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            extension_header,
            payload: &data[offset..end],
        })
    }

    /// Payload bytes with header, CSRCs, extension and padding stripped.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Offset at which the payload starts in the original datagram.
    pub fn payload_offset(&self) -> usize {
        let ext = self
            .extension_header
            .map_or(0, |(_, data)| 4 + data.len());
        FIXED_HEADER_LEN + 4 * usize::from(self.csrc_count) + ext
    }
}

/// Build a datagram for tests: fixed header, optional CSRCs/extension, payload.
#[cfg(test)]
pub(crate) fn build_packet(
    pt: u8,
    seq: u16,
    marker: bool,
    csrcs: &[u32],
    extension_words: Option<u16>,
    payload: &[u8],
) -> Vec<u8> {
    let mut packet = Vec::new();
    let ext_bit = if extension_words.is_some() { 0x10 } else { 0 };
    packet.push((2 << 6) | ext_bit | csrcs.len() as u8);
    packet.push(((marker as u8) << 7) | pt);
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&90_000u32.to_be_bytes());
    packet.extend_from_slice(&0xAABBCCDDu32.to_be_bytes());
    for csrc in csrcs {
        packet.extend_from_slice(&csrc.to_be_bytes());
    }
    if let Some(words) = extension_words {
        packet.extend_from_slice(&0xBEDEu16.to_be_bytes());
        packet.extend_from_slice(&words.to_be_bytes());
        packet.extend(std::iter::repeat_n(0xEE, 4 * usize::from(words)));
    }
    packet.extend_from_slice(payload);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_header() {
        let data = build_packet(96, 0x1234, true, &[], None, &[0x65, 0xAA]);
        let pkt = RtpPacket::parse(&data).unwrap();
        assert_eq!(pkt.version, 2);
        assert!(pkt.marker);
        assert_eq!(pkt.payload_type, 96);
        assert_eq!(pkt.sequence_number, 0x1234);
        assert_eq!(pkt.timestamp, 90_000);
        assert_eq!(pkt.ssrc, 0xAABBCCDD);
        assert_eq!(pkt.payload(), &[0x65, 0xAA]);
        assert_eq!(pkt.payload_offset(), 12);
    }

    #[test]
    fn payload_offset_with_csrcs_and_extension() {
        for (csrcs, words) in [(0usize, None), (2, None), (0, Some(0u16)), (3, Some(2))] {
            let list: Vec<u32> = (0..csrcs as u32).collect();
            let data = build_packet(96, 1, false, &list, words, &[0x41, 0x01]);
            let pkt = RtpPacket::parse(&data).unwrap();
            let expected =
                12 + 4 * csrcs + words.map_or(0, |w| 4 + 4 * usize::from(w));
            assert_eq!(pkt.payload_offset(), expected);
            assert_eq!(pkt.payload(), &[0x41, 0x01]);
        }
    }

    #[test]
    fn extension_exposed() {
        let data = build_packet(96, 1, false, &[], Some(1), &[0x41]);
        let pkt = RtpPacket::parse(&data).unwrap();
        let (id, ext) = pkt.extension_header.unwrap();
        assert_eq!(id, 0xBEDE);
        assert_eq!(ext, &[0xEE; 4]);
    }

    #[test]
    fn shorter_than_offset_rejected() {
        // 2 CSRCs declared but only one present.
        let mut data = build_packet(96, 1, false, &[7], None, &[]);
        data[0] = (2 << 6) | 2;
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(RtspError::RtpTooShort { len: 16, offset: 20 })
        ));

        // Extension claims 10 words, none follow.
        let mut data = build_packet(96, 1, false, &[], Some(0), &[]);
        data[15] = 10;
        assert!(RtpPacket::parse(&data).is_err());

        assert!(RtpPacket::parse(&[0x80, 0x60, 0x00]).is_err());
        assert!(RtpPacket::parse(&[]).is_err());
    }

    #[test]
    fn wrong_version_rejected() {
        let mut data = build_packet(96, 1, false, &[], None, &[0x41]);
        data[0] = (1 << 6) | (data[0] & 0x3f);
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(RtspError::UnsupportedRtpVersion(1))
        ));
    }

    #[test]
    fn padding_stripped() {
        let mut data = build_packet(96, 1, false, &[], None, &[0x41, 0x02, 0, 0, 3]);
        data[0] |= 0x20;
        let pkt = RtpPacket::parse(&data).unwrap();
        assert_eq!(pkt.payload(), &[0x41, 0x02]);

        // Padding count larger than the payload.
        let mut data = build_packet(96, 1, false, &[], None, &[0x41, 9]);
        data[0] |= 0x20;
        assert!(RtpPacket::parse(&data).is_err());
    }
}
