// src/parser.rs
use crate::http::Request;
use memchr::{memchr, memchr3};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No space separates the method from the rest of the line.
    #[error("no space after the method token")]
    MalformedRequest,
}

/// Decode the method and path of a request line.
///
/// The buffer is treated as ending at its first NUL byte. The method runs up
/// to the first space; the path runs from there to the next space, CR or LF
/// (or the end of input). Tokens too long for their fields are truncated.
pub fn parse_request(buf: &[u8]) -> Result<Request, ParseError> {
    let buf = match memchr(0, buf) {
        Some(nul) => &buf[..nul],
        None => buf,
    };

    let space = memchr(b' ', buf).ok_or(ParseError::MalformedRequest)?;
    let method = &buf[..space];

    let rest = &buf[space + 1..];
    let path_end = memchr3(b' ', b'\r', b'\n', rest).unwrap_or(rest.len());

    Ok(Request::new(method, &rest[..path_end]))
}

/// Whether `buf` already holds a full request line.
pub fn has_request_line(buf: &[u8]) -> bool {
    memchr(b'\n', buf).is_some()
}
