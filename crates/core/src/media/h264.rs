use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::error::{Result, RtspError};

/// H.264 RTP depacketizer (RFC 6184).
///
/// Reassembles RTP payloads into complete NAL units and groups them per
/// access unit. The RTP marker bit (RFC 6184 §5.1) closes an access unit:
/// everything accumulated since the previous marker is emitted as one NAL
/// group and the buffer is cleared.
///
/// Payload structures (RFC 6184 §5.2):
///
/// | NAL type | Structure | Handling |
/// |----------|-----------|----------|
/// | 1–23 | Single NAL unit (§5.6) | emitted as-is |
/// | 24 | STAP-A (§5.7.1) | split on 16-bit sizes |
/// | 25 | STAP-B (§5.7.1) | 16-bit DON skipped, then as STAP-A |
/// | 26 / 27 | MTAP16 / MTAP24 (§5.7.2) | DON and timestamp offsets skipped |
/// | 28 | FU-A (§5.8) | fragments joined, NAL header rebuilt |
/// | 29 | FU-B (§5.8) | as FU-A, 16-bit DON skipped on the start fragment |
///
/// FU fragments carry a 2-byte header instead of the NAL header:
///
/// ```text
/// FU indicator:  [F|NRI|Type=28]     (1 byte)
/// FU header:     [S|E|R|NAL_Type]    (1 byte)
/// ```
///
/// The rebuilt NAL header is `(indicator & 0xE0) | (fu_header & 0x1F)`.
///
/// Malformed or truncated payloads never panic: the current access unit is
/// dropped, the buffer resets and processing continues with the next packet.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    /// Complete NAL units of the in-progress access unit.
    nals: Vec<Vec<u8>>,
    /// NAL being reassembled from FU-A/FU-B fragments.
    fragment: Option<Vec<u8>>,
    /// Access units dropped because of malformed input.
    dropped: u64,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one RTP payload (header already stripped).
    ///
    /// Returns the access unit's NAL units when `marker` is set, `None`
    /// while the frame is still incomplete or when it had to be dropped.
    pub fn process(&mut self, payload: &[u8], marker: bool) -> Option<Vec<Vec<u8>>> {
        if let Err(e) = self.push(payload) {
            tracing::debug!(error = %e, dropped_nals = self.nals.len(), "dropping access unit");
            self.reset();
            self.dropped += 1;
            return None;
        }

        if !marker {
            return None;
        }

        if let Some(partial) = self.fragment.take() {
            tracing::debug!(
                partial_len = partial.len(),
                "marker set with unterminated fragmentation unit"
            );
        }
        let nals = std::mem::take(&mut self.nals);

        tracing::trace!(nal_count = nals.len(), "access unit complete");

        if nals.is_empty() { None } else { Some(nals) }
    }

    /// Discard the in-progress access unit (e.g. after packet loss).
    pub fn reset(&mut self) {
        self.nals.clear();
        self.fragment = None;
    }

    /// Number of access units dropped on malformed input so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether fragments of an unfinished access unit are buffered.
    pub fn is_empty(&self) -> bool {
        self.nals.is_empty() && self.fragment.is_none()
    }

    fn push(&mut self, payload: &[u8]) -> Result<()> {
        let (&nal_header, rest) = payload
            .split_first()
            .ok_or_else(|| malformed("empty payload"))?;
        if nal_header & 0x80 != 0 {
            return Err(malformed("forbidden_zero_bit set"));
        }

        match nal_header & 0x1f {
            1..=23 => {
                self.ensure_no_fragment();
                self.nals.push(payload.to_vec());
            }
            24 => {
                self.ensure_no_fragment();
                self.push_aggregate(rest)?;
            }
            25 => {
                self.ensure_no_fragment();
                let units = rest.get(2..).ok_or_else(|| malformed("STAP-B without DON"))?;
                self.push_aggregate(units)?;
            }
            26 => {
                self.ensure_no_fragment();
                self.push_mtap(rest, 2)?;
            }
            27 => {
                self.ensure_no_fragment();
                self.push_mtap(rest, 3)?;
            }
            28 => self.push_fragment(nal_header, rest, false)?,
            29 => self.push_fragment(nal_header, rest, true)?,
            other => return Err(malformed(&format!("unsupported NAL type {other}"))),
        }
        Ok(())
    }

    /// STAP payload after its header (and DON for STAP-B):
    /// repeated `[size:16][NAL]`.
    fn push_aggregate(&mut self, mut data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(malformed("empty aggregation packet"));
        }
        while !data.is_empty() {
            let (size, rest) = read_u16(data).ok_or_else(|| malformed("STAP truncated size"))?;
            let size = usize::from(size);
            if size == 0 || rest.len() < size {
                return Err(malformed("STAP unit exceeds packet"));
            }
            self.nals.push(rest[..size].to_vec());
            data = &rest[size..];
        }
        Ok(())
    }

    /// MTAP payload: `[DONB:16]` then repeated
    /// `[size:16][DOND:8][TS offset:16|24][NAL]`, where size counts from DOND.
    fn push_mtap(&mut self, data: &[u8], ts_offset_len: usize) -> Result<()> {
        let mut data = data.get(2..).ok_or_else(|| malformed("MTAP without DONB"))?;
        let unit_header = 1 + ts_offset_len;
        if data.is_empty() {
            return Err(malformed("empty MTAP"));
        }
        while !data.is_empty() {
            let (size, rest) = read_u16(data).ok_or_else(|| malformed("MTAP truncated size"))?;
            let size = usize::from(size);
            if size <= unit_header || rest.len() < size {
                return Err(malformed("MTAP unit exceeds packet"));
            }
            self.nals.push(rest[unit_header..size].to_vec());
            data = &rest[size..];
        }
        Ok(())
    }

    fn push_fragment(&mut self, indicator: u8, data: &[u8], has_don: bool) -> Result<()> {
        let (&fu_header, mut body) = data
            .split_first()
            .ok_or_else(|| malformed("FU without header"))?;
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        if start && end {
            return Err(malformed("FU with both start and end bits"));
        }

        if start {
            if has_don {
                body = body.get(2..).ok_or_else(|| malformed("FU-B without DON"))?;
            }
            if let Some(partial) = self.fragment.take() {
                tracing::debug!(partial_len = partial.len(), "FU start while fragment in progress");
            }
            let mut nal = Vec::with_capacity(1 + body.len());
            nal.push((indicator & 0xe0) | (fu_header & 0x1f));
            nal.extend_from_slice(body);
            self.fragment = Some(nal);
        } else {
            let nal = self
                .fragment
                .as_mut()
                .ok_or_else(|| malformed("FU continuation without start"))?;
            if nal[0] & 0x1f != fu_header & 0x1f {
                return Err(malformed("FU NAL type changed mid-fragment"));
            }
            nal.extend_from_slice(body);
        }

        if end {
            if let Some(nal) = self.fragment.take() {
                self.nals.push(nal);
            }
        }
        Ok(())
    }

    fn ensure_no_fragment(&mut self) {
        if let Some(partial) = self.fragment.take() {
            tracing::debug!(
                partial_len = partial.len(),
                "unfragmented NAL while fragment in progress"
            );
        }
    }
}

fn read_u16(data: &[u8]) -> Option<(u16, &[u8])> {
    let bytes = data.get(..2)?;
    Some((u16::from_be_bytes([bytes[0], bytes[1]]), &data[2..]))
}

fn malformed(reason: &str) -> RtspError {
    RtspError::Depacketize(reason.to_string())
}

/// H.264 format parameters from `a=fmtp` (RFC 6184 §8.1).
///
/// `sprop-parameter-sets` is a comma-separated list of base64 NAL units;
/// by convention index 0 is the SPS and index 1 the PPS.
#[derive(Debug, Clone, Default)]
pub struct H264Parameters {
    pub packetization_mode: Option<u8>,
    pub profile_level_id: Option<String>,
    pub sprop_parameter_sets: Vec<Vec<u8>>,
}

impl H264Parameters {
    /// Parse a format-parameter string such as
    /// `packetization-mode=1;profile-level-id=42001e;sprop-parameter-sets=Z0IAHqs=,aM44gA==`.
    ///
    /// Undecodable base64 entries are skipped with a warning.
    pub fn parse(fmtp: &str) -> Self {
        let mut params = Self::default();

        for param in fmtp.split(';') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "packetization-mode" => params.packetization_mode = value.parse().ok(),
                "profile-level-id" => params.profile_level_id = Some(value.to_string()),
                "sprop-parameter-sets" => {
                    for set in value.split(',').filter(|s| !s.is_empty()) {
                        match BASE64_STANDARD.decode(set.trim()) {
                            Ok(nal) => params.sprop_parameter_sets.push(nal),
                            Err(e) => {
                                tracing::warn!(error = %e, set, "undecodable sprop-parameter-set")
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        params
    }

    /// `(sps, pps)` when at least two parameter sets were decoded.
    pub fn sps_pps(&self) -> Option<(&[u8], &[u8])> {
        match self.sprop_parameter_sets.as_slice() {
            [sps, pps, ..] => Some((sps, pps)),
            _ => None,
        }
    }
}
