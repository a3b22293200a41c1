use crate::{
    errors::ErrorKind,
    http::types::{self, HeaderMap},
    Method,
};
use memchr::memmem;
use std::{
    borrow::Cow,
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

/// An HTTP request read off one connection.
///
/// Produced once per connection by the header parser and handed to the
/// matching handler by shared reference. It cannot be modified afterwards.
///
/// # Input data requirements
///
/// All incoming data must match the template below. Anything else is
/// answered with `400 Bad Request` and the connection is closed.
///
/// #### Character encoding
///
/// The request line and headers must be `UTF-8`. The body is kept as raw
/// bytes and is never validated.
///
/// #### General designations
/// - `SP`: ASCII space (0x20), exactly one between tokens
/// - `CRLF`: Carriage return + line feed (`"\r\n"`) - **exactly this sequence required**
///
/// ## First line
/// ```text
/// [METHOD] SP [PATH] SP [PROTOCOL] "/" [VERSION] CRLF
/// ```
/// - `[METHOD]`: see [Method](crate::Method)
/// - `[PATH]`: any non-empty token, kept verbatim (query string included)
/// - `[PROTOCOL]`, `[VERSION]`: non-empty, split on the first `/`
///
/// ## Header
/// ```text
/// [NAME] ":" SP [VALUE] CRLF
/// ```
/// Names keep their original spelling. A repeated name overwrites the earlier value.
///
/// The request line and header names must be UTF-8. Values that are not
/// UTF-8 are decoded as ISO-8859-1, one `char` per byte.
///
/// ## Body
///
/// Only bodies with an explicit `Content-Length` are read. Exactly that many
/// bytes are attached; a missing or `0` length means no body at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    url: String,
    protocol: String,
    version: String,

    headers: HeaderMap,
    content_length: Option<usize>,

    body: Vec<u8>,

    peer_addr: SocketAddr,
}

impl Request {
    const UNKNOWN_PEER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

    // `GET / HTTP/1.1` with no headers, for doc examples
    pub(crate) fn blank() -> Self {
        Request {
            method: Method::Get,
            url: "/".to_owned(),
            protocol: "HTTP".to_owned(),
            version: "1.1".to_owned(),

            headers: HeaderMap::default(),
            content_length: None,

            body: Vec::new(),

            peer_addr: Self::UNKNOWN_PEER,
        }
    }

    #[inline(always)]
    pub(crate) fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    #[inline(always)]
    pub(crate) fn set_peer_addr(&mut self, addr: SocketAddr) {
        self.peer_addr = addr;
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request target exactly as received, query string included.
    #[inline(always)]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Protocol token before the `/`, usually `"HTTP"`.
    #[inline(always)]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Version after the `/`, e.g. `"1.1"`.
    #[inline(always)]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline(always)]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value by name; see [`HeaderMap::get`] for matching rules.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Value of the `Host` header, or `""` if the client sent none.
    #[inline]
    pub fn host(&self) -> &str {
        self.header("Host").unwrap_or_default()
    }

    #[inline(always)]
    pub const fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    /// Raw body bytes, empty when no body was declared.
    #[inline(always)]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, `None` if it is not valid UTF-8.
    #[inline]
    pub fn body_str(&self) -> Option<&str> {
        simdutf8::basic::from_utf8(&self.body).ok()
    }

    /// The first line rebuilt from the parsed parts, without `CRLF`.
    pub fn request_line(&self) -> String {
        format!(
            "{} {} {}/{}",
            self.method, self.url, self.protocol, self.version
        )
    }

    /// Address of the client that sent this request.
    #[inline(always)]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request_line())
    }
}

// Parse

/// Parses a request head that does not include its terminating `CRLF CRLF`.
pub(crate) fn parse_header(block: &[u8]) -> Result<Request, ErrorKind> {
    let mut lines = split_lines(block);
    let first = lines.next().ok_or(ErrorKind::InvalidRequestLine)?;
    let (method, url, protocol, version) = parse_request_line(check_utf8(first)?)?;

    let mut headers = HeaderMap::with_capacity(8);
    for line in lines {
        let (name, value) = parse_header_line(line)?;
        headers.insert(check_utf8(name)?, &decode_value(value));
    }

    let content_length = match headers.get("Content-Length") {
        Some(value) => {
            Some(types::slice_to_usize(value.as_bytes()).ok_or(ErrorKind::MalformedHeader)?)
        }
        None => None,
    };

    Ok(Request {
        method,
        url: url.to_owned(),
        protocol: protocol.to_owned(),
        version: version.to_owned(),

        headers,
        content_length,

        body: Vec::new(),

        peer_addr: Request::UNKNOWN_PEER,
    })
}

#[inline(always)]
fn check_utf8(bytes: &[u8]) -> Result<&str, ErrorKind> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| ErrorKind::InvalidEncoding)
}

// Values that are not UTF-8 are read as ISO-8859-1 (obs-text)
#[inline]
fn decode_value(bytes: &[u8]) -> Cow<'_, str> {
    match simdutf8::basic::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

#[inline]
fn split_lines(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(block);

    std::iter::from_fn(move || {
        let current = rest?;
        match memmem::find(current, b"\r\n") {
            Some(i) => {
                rest = Some(&current[i + 2..]);
                Some(&current[..i])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

#[inline]
fn parse_request_line(line: &str) -> Result<(Method, &str, &str, &str), ErrorKind> {
    let mut parts = line.split(' ');

    let (Some(method), Some(url), Some(proto), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ErrorKind::InvalidRequestLine);
    };

    if method.is_empty() || url.is_empty() {
        return Err(ErrorKind::InvalidRequestLine);
    }

    let (protocol, version) = proto
        .split_once('/')
        .filter(|(p, v)| !p.is_empty() && !v.is_empty())
        .ok_or(ErrorKind::InvalidRequestLine)?;

    let method = Method::from_bytes(method.as_bytes())?;

    Ok((method, url, protocol, version))
}

#[inline]
fn parse_header_line(line: &[u8]) -> Result<(&[u8], &[u8]), ErrorKind> {
    let colon = memchr::memchr(b':', line).ok_or(ErrorKind::MalformedHeader)?;
    let name = &line[..colon];

    let value = line[colon + 1..]
        .strip_prefix(b" ")
        .filter(|_| !name.is_empty())
        .ok_or(ErrorKind::MalformedHeader)?;

    Ok((name, value))
}
