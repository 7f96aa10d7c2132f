use crate::error::{ParseErrorKind, RtspError};

/// A parsed RTSP response (RFC 2326 §7).
///
/// RTSP responses follow HTTP/1.1 syntax:
///
/// ```text
/// RTSP-Version SP Status-Code SP Reason-Phrase CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// [`parse`](Self::parse) handles the head; the body (`Content-Length`
/// bytes after the blank line) is read by the connection and attached with
/// [`with_body`](Self::with_body).
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug, Clone)]
pub struct RtspResponse {
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    pub status_code: u16,
    pub reason: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RtspResponse {
    /// Parse the status line and headers of an RTSP response.
    ///
    /// Expects the text up to and including the blank line. Returns
    /// [`RtspError::Parse`] on malformed input.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines().skip_while(|line| line.trim().is_empty());

        let status_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyResponse,
        })?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("RTSP/") {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            });
        }

        let status_code: u16 = parts
            .next()
            .and_then(|code| code.trim().parse().ok())
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            })?;
        let reason = parts.next().unwrap_or("").trim().to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "server sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();

            headers.push((name, value));
        }

        Ok(RtspResponse {
            version: version.to_string(),
            status_code,
            reason,
            headers,
            body: Vec::new(),
        })
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The echoed CSeq (RFC 2326 §12.17), used to pair the response with
    /// the request that provoked it.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq")?.parse().ok()
    }

    /// `Content-Length` in bytes; absent means no body (RFC 2326 §12.14).
    pub fn content_length(&self) -> crate::error::Result<usize> {
        match self.get_header("Content-Length") {
            Some(len) => len.parse().map_err(|_| RtspError::Parse {
                kind: ParseErrorKind::InvalidNumber,
            }),
            None => Ok(0),
        }
    }

    /// 2xx Success (RFC 2326 §7.1.1).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// 401 Unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }

    /// Session ID from the `Session` header with any parameters removed.
    /// Handles timeout suffix: "SESSIONID;timeout=60" -> "SESSIONID"
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ok_response() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.version, "RTSP/1.0");
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.cseq(), Some(1));
        assert!(resp.is_success());
        assert_eq!(resp.content_length().unwrap(), 0);
    }

    #[test]
    fn parse_unauthorized_with_multiword_reason() {
        let raw = "RTSP/1.0 401 Unauthorized Access\r\nCSeq: 2\r\n\
                   WWW-Authenticate: Digest realm=\"R\", nonce=\"N\"\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert!(resp.is_unauthorized());
        assert!(!resp.is_success());
        assert_eq!(resp.reason, "Unauthorized Access");
        assert_eq!(
            resp.get_header("www-authenticate"),
            Some("Digest realm=\"R\", nonce=\"N\"")
        );
    }

    #[test]
    fn session_id_strips_timeout() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: ABC123;timeout=60\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.session_id(), Some("ABC123"));
    }

    #[test]
    fn leading_blank_lines_skipped() {
        let raw = "\r\nRTSP/1.0 200 OK\r\nCSeq: 9\r\n\r\n";
        assert_eq!(RtspResponse::parse(raw).unwrap().cseq(), Some(9));
    }

    #[test]
    fn parse_empty_response() {
        assert!(RtspResponse::parse("").is_err());
    }

    #[test]
    fn parse_request_line_rejected() {
        assert!(RtspResponse::parse("OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").is_err());
    }

    #[test]
    fn parse_invalid_header() {
        assert!(RtspResponse::parse("RTSP/1.0 200 OK\r\nno colon here\r\n\r\n").is_err());
    }

    #[test]
    fn bad_content_length() {
        let resp = RtspResponse::parse("RTSP/1.0 200 OK\r\nContent-Length: x\r\n\r\n").unwrap();
        assert!(resp.content_length().is_err());
    }
}
