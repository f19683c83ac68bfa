// src/http.rs
use arrayvec::ArrayVec;
use std::borrow::Cow;

/// Longest method token kept; longer tokens are truncated.
pub const MAX_METHOD_LEN: usize = 15;
/// Longest path token kept; longer tokens are truncated.
pub const MAX_PATH_LEN: usize = 1023;

/// Routing only cares whether a request is a `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Other,
}

impl Method {
    /// Case-sensitive, as HTTP method tokens are.
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"GET" => Method::Get,
            _ => Method::Other,
        }
    }
}

/// The decoded request line. Headers and body are never looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: ArrayVec<u8, MAX_METHOD_LEN>,
    path: ArrayVec<u8, MAX_PATH_LEN>,
}

impl Request {
    /// Copy both tokens in, silently dropping whatever does not fit.
    pub fn new(method: &[u8], path: &[u8]) -> Self {
        Self {
            method: bounded(method),
            path: bounded(path),
        }
    }

    pub fn method(&self) -> Method {
        Method::from_bytes(&self.method)
    }

    pub fn method_bytes(&self) -> &[u8] {
        &self.method
    }

    pub fn path_bytes(&self) -> &[u8] {
        &self.path
    }

    /// Lossy text form of the method, for logging.
    pub fn method_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.method)
    }

    /// Lossy text form of the path, for logging.
    pub fn path_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }
}

fn bounded<const N: usize>(src: &[u8]) -> ArrayVec<u8, N> {
    let take = src.len().min(N);
    let mut out = ArrayVec::new();
    // Cannot fail: `take` never exceeds the capacity.
    let _ = out.try_extend_from_slice(&src[..take]);
    out
}

/// A complete response. Every body is a fixed in-memory payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: &'static [u8],
}

impl Response {
    pub const fn new(
        status: u16,
        reason: &'static str,
        content_type: &'static str,
        body: &'static [u8],
    ) -> Self {
        Self {
            status,
            reason,
            content_type,
            body,
        }
    }

    pub const fn ok(content_type: &'static str, body: &'static [u8]) -> Self {
        Self::new(200, "OK", content_type, body)
    }

    pub const fn not_found() -> Self {
        Self::new(404, "Not Found", "text/plain", b"File not found!")
    }

    pub const fn method_not_allowed() -> Self {
        Self::new(405, "Method Not Allowed", "text/plain", b"Only GET supported")
    }

    pub const fn bad_request() -> Self {
        Self::new(400, "Bad Request", "text/plain", b"Malformed request")
    }

    /// Exact number of bytes [`encode_into`](Self::encode_into) will append.
    pub fn encoded_len(&self) -> usize {
        let mut status = itoa::Buffer::new();
        let mut length = itoa::Buffer::new();
        b"HTTP/1.1 ".len()
            + status.format(self.status).len()
            + 1
            + self.reason.len()
            + 2
            + b"Content-Type: ".len()
            + self.content_type.len()
            + 2
            + b"Content-Length: ".len()
            + length.format(self.body.len()).len()
            + 2
            + b"Connection: close\r\n\r\n".len()
            + self.body.len()
    }

    /// Append status line, the three fixed headers, a blank line and the
    /// body to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());

        // Status line
        let mut itoa_buf = itoa::Buffer::new();
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(itoa_buf.format(self.status).as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.reason.as_bytes());
        out.extend_from_slice(b"\r\n");

        out.extend_from_slice(b"Content-Type: ");
        out.extend_from_slice(self.content_type.as_bytes());
        out.extend_from_slice(b"\r\n");

        // Byte length, not character count
        out.extend_from_slice(b"Content-Length: ");
        out.extend_from_slice(itoa_buf.format(self.body.len()).as_bytes());
        out.extend_from_slice(b"\r\n");

        out.extend_from_slice(b"Connection: close\r\n\r\n");
        out.extend_from_slice(self.body);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_status_line_headers_and_body() {
        let wire = Response::not_found().to_bytes();
        assert_eq!(
            wire,
            b"HTTP/1.1 404 Not Found\r\n\
              Content-Type: text/plain\r\n\
              Content-Length: 15\r\n\
              Connection: close\r\n\
              \r\n\
              File not found!"
                .to_vec()
        );
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let res = Response::ok("text/plain; charset=utf-8", "héllo ☃".as_bytes());
        let text = String::from_utf8(res.to_bytes()).unwrap();
        assert!(text.contains("Content-Length: 10\r\n"), "{text}");
    }

    #[test]
    fn encoded_len_is_exact() {
        for res in [
            Response::ok("text/html", b"<html></html>"),
            Response::bad_request(),
            Response::method_not_allowed(),
            Response::ok("application/json", b""),
        ] {
            assert_eq!(res.to_bytes().len(), res.encoded_len());
        }
    }

    #[test]
    fn request_tokens_are_truncated_not_rejected() {
        let long_method = [b'M'; 40];
        let long_path = vec![b'a'; 5000];
        let req = Request::new(&long_method, &long_path);
        assert_eq!(req.method_bytes().len(), MAX_METHOD_LEN);
        assert_eq!(req.path_bytes().len(), MAX_PATH_LEN);
        assert_eq!(req.method(), Method::Other);
    }

    #[test]
    fn method_lookup_is_case_sensitive() {
        assert_eq!(Request::new(b"GET", b"/").method(), Method::Get);
        assert_eq!(Request::new(b"get", b"/").method(), Method::Other);
        assert_eq!(Request::new(b"POST", b"/").method(), Method::Other);
    }
}
