//! HTTP response builder and its wire serialization.

use crate::{http::types::StatusCode, Request};
use std::borrow::Cow;

/// HTTP response handed to a handler for filling in.
///
/// The connection creates it before dispatch with the request's protocol,
/// version and `Host` echoed back and a `404 Not Found` status. A handler
/// that does nothing therefore produces a valid not-found answer.
///
/// # Examples
/// ```
/// # oneshot_http::run_test(|_req, resp| {
/// use oneshot_http::StatusCode;
///
/// resp.status(StatusCode::Ok)
///     .host("localhost")
///     .content_type("text/html")
///     .body("<h1>Hello World</h1>");
///
/// assert_eq!(resp.status_code(), 200);
/// # });
/// ```
///
/// # Wire format
/// Serialization always emits exactly these three headers:
/// ```text
/// [PROTOCOL]/[VERSION] SP [CODE] SP [TEXT] CRLF
/// Server: [HOST] CRLF
/// Content-Type: [CONTENT_TYPE] CRLF
/// Content-Length: [BODY LENGTH] CRLF
/// CRLF
/// [BODY]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status_code: u16,
    status_text: Cow<'static, str>,
    host: String,
    protocol: String,
    version: String,
    content_type: String,
    body: Vec<u8>,
}

impl Response {
    #[inline]
    pub(crate) fn for_request(req: &Request) -> Self {
        let mut resp = Self::with_version(req.protocol(), req.version());
        resp.host.push_str(req.host());
        resp
    }

    #[inline]
    pub(crate) fn with_version(protocol: &str, version: &str) -> Self {
        Self {
            status_code: StatusCode::NotFound.as_u16(),
            status_text: Cow::Borrowed(StatusCode::NotFound.reason()),
            host: String::new(),
            protocol: protocol.to_owned(),
            version: version.to_owned(),
            content_type: String::new(),
            body: Vec::new(),
        }
    }

    /// Renders the response exactly as it goes on the wire.
    ///
    /// `Content-Length` is always the body length at the time of the call.
    pub fn serialize(&self) -> Vec<u8> {
        let head = format!(
            "{}/{} {} {}\r\nServer: {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            self.protocol,
            self.version,
            self.status_code,
            self.status_text,
            self.host,
            self.content_type,
            self.body.len(),
        );

        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Builder methods
impl Response {
    /// Sets the status line from a known status code.
    ///
    /// # Examples
    /// ```
    /// # oneshot_http::run_test(|_req, resp| {
    /// use oneshot_http::StatusCode;
    ///
    /// resp.status(StatusCode::Created);
    /// assert_eq!(resp.status_text(), "Created");
    /// # });
    /// ```
    #[inline]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status_code = status.as_u16();
        self.status_text = Cow::Borrowed(status.reason());
        self
    }

    /// Sets an arbitrary status code and reason phrase.
    #[inline]
    pub fn status_raw<T: Into<Cow<'static, str>>>(&mut self, code: u16, text: T) -> &mut Self {
        self.status_code = code;
        self.status_text = text.into();
        self
    }

    /// Value sent in the `Server` header.
    #[inline]
    pub fn host<T: AsRef<str>>(&mut self, host: T) -> &mut Self {
        self.host.clear();
        self.host.push_str(host.as_ref());
        self
    }

    #[inline]
    pub fn content_type<T: AsRef<str>>(&mut self, content_type: T) -> &mut Self {
        self.content_type.clear();
        self.content_type.push_str(content_type.as_ref());
        self
    }

    /// Replaces the body.
    ///
    /// # Examples
    /// ```
    /// # oneshot_http::run_test(|_req, resp| {
    /// resp.body("{\"asdf\":\"asdf\"}");
    /// assert_eq!(resp.get_body().len(), 15);
    ///
    /// resp.body(vec![0u8, 1, 2]);
    /// assert_eq!(resp.get_body(), &[0, 1, 2]);
    /// # });
    /// ```
    #[inline]
    pub fn body<T: Into<Vec<u8>>>(&mut self, body: T) -> &mut Self {
        self.body = body.into();
        self
    }
}

/// Getters
impl Response {
    #[inline(always)]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    #[inline(always)]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    #[inline(always)]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[inline(always)]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline(always)]
    pub fn get_host(&self) -> &str {
        &self.host
    }

    #[inline(always)]
    pub fn get_content_type(&self) -> &str {
        &self.content_type
    }

    #[inline(always)]
    pub fn get_body(&self) -> &[u8] {
        &self.body
    }
}
