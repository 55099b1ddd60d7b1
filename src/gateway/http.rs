/*!
HTTP helpers for the gateway: tolerant request parsing, endpoint classification and
plain-text responses.

One request per connection. Headers end at CRLFCRLF or LFLF and are capped at 64 KiB;
bodies (Content-Length or chunked) are capped at 1 MiB. Parse failures are reported
through `io::ErrorKind`:
- `InvalidInput`: header block too large (431)
- `FileTooLarge`: body too large (413)
- anything else: malformed request (400)
*/

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};

pub const HDR_CAP: usize = 64 * 1024;
pub const BODY_CAP: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Other(m) => m,
        }
    }
}

/// Routes the gateway answers itself; everything else may fall through to static files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Execute,
    /// Raw (still percent-encoded) trailing segment.
    Download(String),
}

impl Endpoint {
    /// Value for the `Allow` header of a 405 answer.
    pub fn allow(&self) -> &'static str {
        match self {
            Endpoint::Execute => "POST",
            Endpoint::Download(_) => "GET",
        }
    }

    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            Endpoint::Execute => *method == Method::Post,
            Endpoint::Download(_) => *method == Method::Get,
        }
    }
}

/// Case-insensitive header map (keys lowercased).
pub type HeaderMap = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path without query string, case preserved.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Read a single request from `reader`.
pub fn read_http_request<R: Read>(reader: &mut R) -> io::Result<HttpRequest> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        if buf.len() >= HDR_CAP {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "request headers too large",
            ));
        }
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of headers",
            ));
        }
        buf.extend_from_slice(&tmp[..n]);
    };
    if header_end > HDR_CAP {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "request headers too large",
        ));
    }

    let header_str = String::from_utf8_lossy(&buf[..header_end]);
    let mut lines = header_str.lines();
    let request_line = lines.next().unwrap_or_default().trim();
    let (method, path) = parse_request_line(request_line)?;
    let headers = parse_headers(lines);

    // Bytes already read past the header block come first.
    let leftover = buf[header_end..].to_vec();
    let mut rest = BufReader::new(Cursor::new(leftover).chain(reader));

    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);
    let body = if chunked {
        read_chunked_body(&mut rest)?
    } else {
        let len = match headers.get("content-length") {
            Some(v) => v.trim().parse::<usize>().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "invalid Content-Length")
            })?,
            None => 0,
        };
        if len > BODY_CAP {
            return Err(body_too_large());
        }
        let mut body = vec![0u8; len];
        rest.read_exact(&mut body)?;
        body
    };

    Ok(HttpRequest {
        method,
        path,
        headers,
        body,
    })
}

/// Classify a request path into a known endpoint.
pub fn classify_endpoint(path: &str) -> Option<Endpoint> {
    if path == "/execute" {
        return Some(Endpoint::Execute);
    }
    path.strip_prefix("/download/")
        .map(|name| Endpoint::Download(name.to_string()))
}

/// Complete `text/plain` response with `Content-Length`.
pub fn respond_plain<W: Write>(w: &mut W, status: &str, body: &str) -> io::Result<()> {
    respond_plain_with(w, status, &[], body)
}

pub fn respond_plain_with<W: Write>(
    w: &mut W,
    status: &str,
    extra_headers: &[(&str, &str)],
    body: &str,
) -> io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (k, v) in extra_headers {
        head.push_str(&format!("{k}: {v}\r\n"));
    }
    head.push_str("\r\n");
    w.write_all(head.as_bytes())?;
    w.write_all(body.as_bytes())?;
    w.flush()
}

/// Index just after the header terminator (CRLFCRLF or LFLF), if present.
pub(crate) fn find_header_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn body_too_large() -> io::Error {
    io::Error::new(io::ErrorKind::FileTooLarge, "request body too large")
}

fn parse_request_line(line: &str) -> io::Result<(Method, String)> {
    let mut parts = line.split_whitespace();
    let (Some(m), Some(target)) = (parts.next(), parts.next()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "malformed request line",
        ));
    };
    let method = match m.to_ascii_uppercase().as_str() {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        "POST" => Method::Post,
        other => Method::Other(other.to_string()),
    };
    let path = target.split(['?', '#']).next().unwrap_or(target).to_string();
    Ok((method, path))
}

fn parse_headers<'a, I: Iterator<Item = &'a str>>(lines: I) -> HeaderMap {
    let mut map = HeaderMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            map.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }
    map
}

// One line without its CRLF/LF; `None` at end of stream.
fn read_line<B: BufRead>(r: &mut B) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    let n = r.by_ref().take(HDR_CAP as u64).read_until(b'\n', &mut line)?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

fn read_chunked_body<B: BufRead>(r: &mut B) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let Some(line) = read_line(r)? else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunked body ended without a last chunk",
            ));
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Chunk extensions after ';' are ignored.
        let size_hex = line.split(';').next().unwrap_or(line).trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size"))?;
        if size == 0 {
            // Trailers until a blank line (or EOF).
            while let Some(t) = read_line(r)? {
                if t.trim().is_empty() {
                    break;
                }
            }
            return Ok(body);
        }
        if body.len() + size > BODY_CAP {
            return Err(body_too_large());
        }
        let start = body.len();
        body.resize(start + size, 0);
        r.read_exact(&mut body[start..])?;
        // CRLF after the payload.
        let _ = read_line(r)?;
    }
}
