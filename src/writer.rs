//! Response sinks.
//!
//! A [`ResponseWriter`] is where a response ends up: headers, one status line,
//! body bytes. The dispatcher writes every [`Response`](crate::Response)
//! through one, wrapped in an [`InstrumentedWriter`] so the access log can
//! report what was actually sent.
//!
//! ```text
//! handler → Response ──write_to──▶ InstrumentedWriter ──▶ BufferedWriter ──▶ hyper
//!                                   (status, size)
//! ```

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

/// The destination of a single HTTP response.
///
/// Only the first [`write_header`](ResponseWriter::write_header) takes
/// effect. Writing body bytes before any status implies `200 OK`.
pub trait ResponseWriter {
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn write_header(&mut self, status: StatusCode);
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Pushes buffered bytes towards the client. A no-op for sinks that only
    /// deliver once the response is complete.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

// ── BufferedWriter ────────────────────────────────────────────────────────────

/// Collects a whole response in memory and hands it to hyper as one body.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Finishes the response. A sink nobody wrote a status to answers `200 OK`.
    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if let Some(current) = self.status {
            warn!(
                source = "rest",
                current = current.as_u16(),
                ignored = status.as_u16(),
                "superfluous write_header call"
            );
            return;
        }
        self.status = Some(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

// ── InstrumentedWriter ────────────────────────────────────────────────────────

/// Decorator that records the status code and byte count of whatever passes
/// through it. Every call is forwarded unchanged to the wrapped sink.
#[derive(Debug)]
pub struct InstrumentedWriter<W> {
    inner: W,
    status: u16,
    size: usize,
}

impl<W: ResponseWriter> InstrumentedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, status: 0, size: 0 }
    }

    /// The last status passed to `write_header`, or `0` if none was.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Total body bytes the wrapped sink accepted.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for InstrumentedWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status = status.as_u16();
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        if let Ok(n) = result {
            self.size += n;
        }
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
