use std::fmt;

/// RTSP methods issued by the client (RFC 2326 §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing RTSP request (RFC 2326 §6).
///
/// Serializes to the standard text format:
///
/// ```text
/// DESCRIBE rtsp://server/stream RTSP/1.0\r\n
/// CSeq: 2\r\n
/// Accept: application/sdp\r\n
/// \r\n
/// ```
///
/// Built by chaining [`add_header`](Self::add_header), then hand
/// the request to a [`MessageChannel`](crate::transport::MessageChannel),
/// which assigns the `CSeq` and calls [`serialize`](Self::serialize).
/// Client requests never carry a body.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    /// Request-URI (e.g. `rtsp://host:554/stream/trackID=1`).
    pub uri: String,
    /// Headers as ordered (name, value) pairs, excluding `CSeq`.
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        RtspRequest {
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn options(uri: &str) -> Self {
        Self::new(Method::Options, uri)
    }

    /// DESCRIBE asks for an SDP answer (RFC 2326 §10.2).
    pub fn describe(uri: &str) -> Self {
        Self::new(Method::Describe, uri).add_header("Accept", "application/sdp")
    }

    pub fn setup(uri: &str, transport: &str) -> Self {
        Self::new(Method::Setup, uri).add_header("Transport", transport)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Adds the header only when a value is present.
    pub fn add_optional_header(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.add_header(name, value),
            None => self,
        }
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether this request was sent with credentials.
    pub fn is_authorized(&self) -> bool {
        self.get_header("Authorization").is_some()
    }

    /// Serialize to the RTSP text wire format with the given `CSeq`
    /// (RFC 2326 §12.17).
    pub fn serialize(&self, cseq: u32) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        request.push_str(&format!("CSeq: {}\r\n", cseq));

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        request.push_str("\r\n");
        request
    }
}
