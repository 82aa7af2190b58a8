//! Minimal HTTP/1.0 client helpers for the alert endpoint
//!
//! The request is built by hand and sent as HTTP/1.0, so the server answers
//! with an identity-encoded body and closes the connection when done.

use crate::BoardError;
use core::fmt::Write;
use core::net::Ipv4Addr;
use heapless::String;

/// Upper bound of a formatted request
pub const MAX_REQUEST_LEN: usize = 256;

/// Parsed `http://host[:port]/path` URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertUrl<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

impl<'a> AlertUrl<'a> {
    /// Parse a plain `http://` URL; TLS endpoints are not supported
    pub fn parse(url: &'a str) -> Result<Self, BoardError> {
        let rest = url.trim().strip_prefix("http://").ok_or(BoardError::InvalidUrl)?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| BoardError::InvalidUrl)?,
            ),
            None => (authority, 80),
        };
        if host.is_empty() || port == 0 {
            return Err(BoardError::InvalidUrl);
        }
        Ok(Self { host, port, path })
    }

    /// Host as an IPv4 literal, if it is one (no DNS lookup needed)
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.host.parse().ok()
    }
}

/// Build the GET request for `url`
pub fn format_get_request(url: &AlertUrl<'_>) -> Result<String<MAX_REQUEST_LEN>, BoardError> {
    let mut request = String::new();
    let written = if url.port == 80 {
        write!(request, "GET {} HTTP/1.0\r\nHost: {}\r\n", url.path, url.host)
    } else {
        write!(
            request,
            "GET {} HTTP/1.0\r\nHost: {}:{}\r\n",
            url.path, url.host, url.port
        )
    };
    written
        .and_then(|_| request.write_str("Accept: application/json\r\nConnection: close\r\n\r\n"))
        .map_err(|_| BoardError::InvalidUrl)?;
    Ok(request)
}

/// Status code and body of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse<'a> {
    pub status: u16,
    pub body: &'a [u8],
}

/// Split a raw response into status code and body
pub fn parse_response(raw: &[u8]) -> Result<HttpResponse<'_>, BoardError> {
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or(BoardError::ProtocolError)?;
    let head = core::str::from_utf8(&raw[..header_end]).map_err(|_| BoardError::ProtocolError)?;
    let status_line = head.split("\r\n").next().unwrap_or("");

    let mut parts = status_line.split(' ').filter(|part| !part.is_empty());
    match parts.next() {
        Some(version) if version.starts_with("HTTP/") => {}
        _ => return Err(BoardError::ProtocolError),
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(BoardError::ProtocolError)?;

    Ok(HttpResponse {
        status,
        body: &raw[header_end + 4..],
    })
}
