//! Blocking HTTP/1.1 over any Read + Write stream (plain TCP or rustls).
//!
//! Surface:
//! - one request per connection, `Connection: close` on every response
//! - chunked transfer encoding is rejected
//! - POST/PUT/PATCH need Content-Length
//! - header cap 32 KiB, body cap 1 MiB (enforced with Read::take)

use std::io::{Read, Write};

use serde::Serialize;

/// Maximum header section size (32 KiB)
pub const MAX_HEADER_SIZE: usize = 32 * 1024;

/// Maximum request body size (1 MiB)
pub const MAX_BODY_SIZE: usize = 1_048_576;

/// Parsed request. `path` has the query string split off into `query`.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Build a request without a transport (`target` may carry `?query`).
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.to_string(),
            path,
            query,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// First header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
    }

    /// JSON body; a serialization failure turns into a 500.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, "application/json", body),
            Err(e) => Self::text(500, &format!("serialize response: {}\n", e)),
        }
    }

    pub fn not_found() -> Self {
        Self::text(404, "not found\n")
    }

    pub fn method_not_allowed(allow: &str) -> Self {
        let mut r = Self::text(405, "method not allowed\n");
        r.headers.push(("Allow".to_string(), allow.to_string()));
        r
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (target.to_string(), None),
    }
}

/// Read and parse one request.
///
/// None: the peer closed (or errored) before sending anything.
/// Some(Err): malformed request; the caller answers 400.
pub fn read_request(stream: &mut impl Read) -> Option<Result<HttpRequest, String>> {
    let mut header_buf = Vec::with_capacity(4096);
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte) {
            Ok(0) => {
                if header_buf.is_empty() {
                    return None;
                }
                return Some(Err("connection closed mid-request".to_string()));
            }
            Ok(_) => {
                header_buf.push(byte[0]);
                if header_buf.len() > MAX_HEADER_SIZE {
                    return Some(Err("headers too large".to_string()));
                }
                if header_buf.ends_with(b"\r\n\r\n") {
                    break;
                }
            }
            Err(e) => {
                if header_buf.is_empty() {
                    return None;
                }
                return Some(Err(format!("read error: {}", e)));
            }
        }
    }

    let mut parsed_headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut parsed_headers);
    match req.parse(&header_buf) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Some(Err("incomplete HTTP request".to_string())),
        Err(e) => return Some(Err(format!("HTTP parse error: {}", e))),
    }

    let method = req.method.unwrap_or("").to_string();
    let (path, query) = split_target(req.path.unwrap_or("/"));

    let mut headers = Vec::new();
    let mut content_length: Option<usize> = None;
    let mut chunked = false;
    for h in req.headers.iter() {
        let name = h.name.to_string();
        let value = String::from_utf8_lossy(h.value).to_string();
        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = value.trim().parse().ok();
        }
        if name.eq_ignore_ascii_case("Transfer-Encoding")
            && value.to_ascii_lowercase().contains("chunked")
        {
            chunked = true;
        }
        headers.push((name, value));
    }

    if chunked {
        return Some(Err("chunked transfer encoding not supported".to_string()));
    }

    let body = if matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
        let Some(len) = content_length else {
            return Some(Err("POST requires Content-Length".to_string()));
        };
        if len > MAX_BODY_SIZE {
            return Some(Err("request body too large".to_string()));
        }
        let mut body = Vec::with_capacity(len);
        if let Err(e) = stream.take(len as u64).read_to_end(&mut body) {
            return Some(Err(format!("read body: {}", e)));
        }
        if body.len() < len {
            return Some(Err("connection closed mid-body".to_string()));
        }
        body
    } else {
        Vec::new()
    };

    Some(Ok(HttpRequest {
        method,
        path,
        query,
        headers,
        body,
    }))
}

/// Write a response. I/O errors are returned; the connection is closed afterwards anyway.
pub fn write_response(stream: &mut impl Write, response: &HttpResponse) -> std::io::Result<()> {
    write_with(stream, response, true)
}

/// HEAD answer: same status and headers (Content-Length included), no body.
pub fn write_head(stream: &mut impl Write, response: &HttpResponse) -> std::io::Result<()> {
    write_with(stream, response, false)
}

fn write_with(stream: &mut impl Write, response: &HttpResponse, body: bool) -> std::io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason(response.status),
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes())?;
    if body && !response.body.is_empty() {
        stream.write_all(&response.body)?;
    }
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_get_with_query() {
        let raw = b"GET /ui/info?email=a%40b.c&pw=x HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let req = read_request(&mut Cursor::new(raw.to_vec())).unwrap().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/ui/info");
        assert_eq!(req.query.as_deref(), Some("email=a%40b.c&pw=x"));
        assert_eq!(req.header("host"), Some("localhost"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn parses_post_body() {
        let body = "email=someone&password=pw";
        let raw = format!(
            "POST /ui/info HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = read_request(&mut Cursor::new(raw.into_bytes())).unwrap().unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.query, None);
        assert_eq!(req.body, body.as_bytes());
    }

    #[test]
    fn rejects_chunked_and_missing_length() {
        let raw = b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        let err = read_request(&mut Cursor::new(raw.to_vec())).unwrap().unwrap_err();
        assert!(err.contains("chunked"));

        let raw = b"POST /x HTTP/1.1\r\nHost: a\r\n\r\n";
        let err = read_request(&mut Cursor::new(raw.to_vec())).unwrap().unwrap_err();
        assert!(err.contains("Content-Length"));
    }

    #[test]
    fn rejects_oversized_input() {
        let raw = format!("GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n", "A".repeat(MAX_HEADER_SIZE));
        let err = read_request(&mut Cursor::new(raw.into_bytes())).unwrap().unwrap_err();
        assert!(err.contains("too large"));

        let raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_SIZE + 1);
        let err = read_request(&mut Cursor::new(raw.into_bytes())).unwrap().unwrap_err();
        assert!(err.contains("too large"));
    }

    #[test]
    fn short_body_is_an_error() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        let err = read_request(&mut Cursor::new(raw.to_vec())).unwrap().unwrap_err();
        assert!(err.contains("mid-body"));
    }

    #[test]
    fn empty_stream_is_none() {
        assert!(read_request(&mut Cursor::new(Vec::<u8>::new())).is_none());
    }

    #[test]
    fn writes_status_line_and_headers() {
        let resp = HttpResponse::json(202, &serde_json::json!({"id": 1}));
        let mut buf = Vec::new();
        write_response(&mut buf, &resp).unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.starts_with("HTTP/1.1 202 Accepted\r\n"));
        assert!(out.contains("Content-Length: 8\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.contains("Content-Type: application/json\r\n"));
        assert!(out.ends_with("{\"id\":1}"));
    }

    #[test]
    fn head_keeps_length_but_drops_body() {
        let resp = HttpResponse::text(200, "0123456789");
        let mut buf = Vec::new();
        write_head(&mut buf, &resp).unwrap();
        let out = String::from_utf8_lossy(&buf);
        assert!(out.contains("Content-Length: 10\r\n"), "{out}");
        assert!(out.ends_with("\r\n\r\n"), "{out}");
    }
}
