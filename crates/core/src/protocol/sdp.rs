//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! Consumes the body of a DESCRIBE response. Only what the client needs is
//! kept: the ordered list of media blocks, each with its media type,
//! payload type numbers and ordered `a=` attributes. A typical answer:
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 192.168.1.100
//! s=Stream
//! t=0 0
//! m=video 0 RTP/AVP 96                          ← media block starts
//! a=rtpmap:96 H264/90000                        ← encoding name / clock
//! a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAHqs=,aM44gA==
//! a=control:trackID=1
//! m=audio 0 RTP/AVP 0
//! a=control:trackID=2
//! ```
//!
//! Session-level lines before the first `m=` are skipped.

use crate::error::{ParseErrorKind, Result, RtspError};

/// A parsed session description: the media blocks in order.
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    pub medias: Vec<MediaDescription>,
}

/// One `m=` block and the attributes that follow it.
#[derive(Debug, Clone)]
pub struct MediaDescription {
    /// `video`, `audio`, `application`, ...
    pub media_type: String,
    pub port: u16,
    /// Transport protocol, e.g. `RTP/AVP`.
    pub protocol: String,
    /// Payload type numbers from the format list, in order.
    pub payload_types: Vec<u8>,
    /// `a=` attributes as ordered (key, value) pairs; flag attributes have an
    /// empty value.
    pub attributes: Vec<(String, String)>,
}

/// `a=rtpmap:<pt> <encoding>/<clock>[/<params>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding_name: String,
    pub clock_rate: u32,
}

impl SessionDescription {
    /// Parse an SDP body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(body);
        let mut medias: Vec<MediaDescription> = Vec::new();

        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let (kind, value) = line.split_once('=').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidSdpLine,
            })?;

            match kind {
                "m" => medias.push(MediaDescription::parse_media_line(value)?),
                "a" => {
                    if let Some(media) = medias.last_mut() {
                        let (key, value) = value.split_once(':').unwrap_or((value, ""));
                        media
                            .attributes
                            .push((key.trim().to_string(), value.trim().to_string()));
                    }
                }
                _ => {}
            }
        }

        tracing::trace!(media_count = medias.len(), "SDP parsed");
        Ok(SessionDescription { medias })
    }

    /// The first `video` media block, if any. Later video blocks are ignored.
    pub fn first_video(&self) -> Option<&MediaDescription> {
        self.medias.iter().find(|m| m.is_video())
    }
}

impl MediaDescription {
    /// `m=<media> <port>[/<count>] <proto> <fmt> ...`
    fn parse_media_line(value: &str) -> Result<Self> {
        let mut fields = value.split_whitespace();
        let invalid = || RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        };

        let media_type = fields.next().ok_or_else(invalid)?.to_string();
        let port = fields
            .next()
            .and_then(|p| p.split('/').next())
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let protocol = fields.next().ok_or_else(invalid)?.to_string();
        let payload_types = fields.filter_map(|f| f.parse().ok()).collect();

        Ok(MediaDescription {
            media_type,
            port,
            protocol,
            payload_types,
            attributes: Vec::new(),
        })
    }

    pub fn is_video(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("video")
    }

    /// The first payload type of the format list.
    pub fn payload_type(&self) -> Option<u8> {
        self.payload_types.first().copied()
    }

    /// First value of the attribute with this key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn control(&self) -> Option<&str> {
        self.attribute("control")
    }

    pub fn rtpmap(&self) -> Option<RtpMap> {
        let value = self.attribute("rtpmap")?;
        let (pt, encoding) = value.split_once(' ')?;
        let mut parts = encoding.trim().split('/');
        let encoding_name = parts.next()?.to_string();
        let clock_rate = parts.next().and_then(|c| c.parse().ok()).unwrap_or(0);
        Some(RtpMap {
            payload_type: pt.trim().parse().ok()?,
            encoding_name,
            clock_rate,
        })
    }

    /// The format-parameter string of `a=fmtp:<pt> <params>`.
    pub fn fmtp(&self) -> Option<&str> {
        let value = self.attribute("fmtp")?;
        Some(value.split_once(' ').map_or("", |(_, params)| params.trim()))
    }

    /// Encoding name, upper-cased: from `rtpmap` when present, else from the
    /// static payload type table (RFC 3551 §6).
    pub fn encoding_name(&self) -> Option<String> {
        if let Some(rtpmap) = self.rtpmap() {
            return Some(rtpmap.encoding_name.to_ascii_uppercase());
        }
        let name = match self.payload_type()? {
            26 => "JPEG",
            31 => "H261",
            32 => "MPV",
            33 => "MP2T",
            34 => "H263",
            _ => return None,
        };
        Some(name.to_string())
    }
}
