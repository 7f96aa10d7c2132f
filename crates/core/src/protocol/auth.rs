//! RTSP authentication (RFC 2326 §D.1, RFC 2617).
//!
//! The server answers an unauthenticated request with `401 Unauthorized`
//! and a `WWW-Authenticate` challenge:
//!
//! ```text
//! WWW-Authenticate: Basic realm="camera"
//! WWW-Authenticate: Digest realm="AXIS_0123", nonce="000057c3Y8106", stale=FALSE
//! ```
//!
//! The challenge is cached for the lifetime of the session and every later
//! request carries an `Authorization` header computed from it. Digest is the
//! single-round variant without `qop`/`cnonce`, which is what RTSP cameras
//! in practice expect.

use base64::prelude::{BASE64_STANDARD, Engine as _};
use md5::{Digest, Md5};

use super::request::Method;

/// Username/password pair, usually taken from the URL user-info.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A cached `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Basic { realm: String },
    Digest { realm: String, nonce: String },
}

impl AuthChallenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// The value is split on commas and spaces (outside quotes). The first
    /// token selects the scheme; later `key=value` tokens fill `realm` and
    /// `nonce`, trimmed of quotes and whitespace. Unknown schemes yield `None`.
    ///
    /// ```
    /// use rtsp::protocol::auth::AuthChallenge;
    ///
    /// let c = AuthChallenge::parse(r#"Digest realm="R", nonce="N", stale=FALSE"#).unwrap();
    /// assert_eq!(c, AuthChallenge::Digest { realm: "R".into(), nonce: "N".into() });
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let tokens = tokenize(header);
        let (scheme, params) = tokens.split_first()?;

        let mut realm = String::new();
        let mut nonce = String::new();
        for token in params {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let value = value.trim_matches(|c: char| c == '"' || c.is_whitespace());
            match key.trim() {
                k if k.eq_ignore_ascii_case("realm") => realm = value.to_string(),
                k if k.eq_ignore_ascii_case("nonce") => nonce = value.to_string(),
                _ => {}
            }
        }

        if scheme.eq_ignore_ascii_case("Basic") {
            Some(Self::Basic { realm })
        } else if scheme.eq_ignore_ascii_case("Digest") {
            Some(Self::Digest { realm, nonce })
        } else {
            tracing::warn!(scheme = %scheme, "unsupported authentication scheme");
            None
        }
    }

    pub fn realm(&self) -> &str {
        match self {
            Self::Basic { realm } | Self::Digest { realm, .. } => realm,
        }
    }

    /// Compute the `Authorization` header value for a request.
    ///
    /// Returns `None` (the request goes out unauthenticated) when the
    /// username, password or realm is empty, or for Digest when the nonce
    /// is empty.
    pub fn authorization(&self, credentials: &Credentials, method: Method, uri: &str) -> Option<String> {
        if credentials.username.is_empty()
            || credentials.password.is_empty()
            || self.realm().is_empty()
        {
            return None;
        }

        match self {
            Self::Basic { .. } => Some(basic_authorization(credentials)),
            Self::Digest { realm, nonce } => {
                if nonce.is_empty() {
                    return None;
                }
                let response = digest_response(credentials, realm, nonce, method.as_str(), uri);
                Some(format!(
                    "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
                    credentials.username, realm, nonce, uri, response
                ))
            }
        }
    }
}

/// `Basic base64(username:password)`.
pub fn basic_authorization(credentials: &Credentials) -> String {
    let pair = format!("{}:{}", credentials.username, credentials.password);
    format!("Basic {}", BASE64_STANDARD.encode(pair))
}

/// RFC 2617 digest without `qop`:
/// `MD5(MD5(user:realm:pass):nonce:MD5(method:uri))`, lower-case hex.
pub fn digest_response(
    credentials: &Credentials,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    let ha1 = md5_hex(&format!(
        "{}:{}:{}",
        credentials.username, realm, credentials.password
    ));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    md5_hex(&format!("{ha1}:{nonce}:{ha2}"))
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split on commas and spaces, keeping quoted strings whole.
fn tokenize(header: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in header.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' | ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
