/*!
Test support helpers shared across integration tests.

- TestGateway: in-process gateway on an ephemeral port with its own scripts/temp dirs
- request()/execute(): raw HTTP/1.1 over TcpStream, response read until close
- Response: status, headers, de-chunked body and trailers
- have(bin): PATH lookup for tests that need host tools

Helpers do not print skip messages themselves so each test owns its "skipping: ..." line.
*/

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ecui_runner::{start_gateway, GatewayConfig, GatewayHandle};

pub struct TestGateway {
    handle: Option<GatewayHandle>,
    pub port: u16,
    pub dir: tempfile::TempDir,
}

impl TestGateway {
    #[allow(dead_code)]
    pub fn scripts_dir(&self) -> PathBuf {
        self.dir.path().join("scripts")
    }

    #[allow(dead_code)]
    pub fn temp_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.stop();
        }
    }
}

#[allow(dead_code)]
pub fn start(timeout: Duration) -> TestGateway {
    start_with(timeout, |cfg, _| cfg)
}

/// Start a gateway; `tweak` may adjust the config (it gets the test root dir).
pub fn start_with(
    timeout: Duration,
    tweak: impl FnOnce(GatewayConfig, &Path) -> GatewayConfig,
) -> TestGateway {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("scripts")).expect("scripts dir");
    let cfg = GatewayConfig::new(dir.path().join("scripts"))
        .host("127.0.0.1")
        .port(0)
        .temp_dir(dir.path().join("tmp"))
        .timeout(timeout);
    let cfg = tweak(cfg, dir.path());
    let handle = start_gateway(cfg).expect("start gateway");
    TestGateway {
        port: handle.addr().port(),
        handle: Some(handle),
        dir,
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub trailers: Vec<(String, String)>,
}

impl Response {
    #[allow(dead_code)]
    pub fn header(&self, name: &str) -> Option<&str> {
        find(&self.headers, name)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[allow(dead_code)]
    pub fn exit_code(&self) -> Option<i32> {
        find(&self.trailers, "x-exit-code").and_then(|v| v.parse().ok())
    }

    /// Parsed download manifest following the sentinel, if present.
    #[allow(dead_code)]
    pub fn manifest(&self) -> Option<serde_json::Value> {
        let text = self.text();
        let (_, json) = text.split_once("\n---DOWNLOAD-INFO---\n")?;
        serde_json::from_str(json.trim()).ok()
    }
}

fn find<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Send one request and read the whole response (the server always closes).
pub fn request(port: u16, method: &str, path: &str, body: Option<&[u8]>) -> Response {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect failed");
    stream
        .set_read_timeout(Some(Duration::from_secs(60)))
        .expect("read timeout");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    if let Some(b) = body {
        req.push_str("Content-Type: application/json\r\n");
        req.push_str(&format!("Content-Length: {}\r\n", b.len()));
    }
    req.push_str("\r\n");
    stream.write_all(req.as_bytes()).expect("write failed");
    if let Some(b) = body {
        stream.write_all(b).expect("write body failed");
    }
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).expect("read failed");
    parse_response(&raw)
}

#[allow(dead_code)]
pub fn execute(port: u16, body: &serde_json::Value) -> Response {
    let bytes = serde_json::to_vec(body).expect("json");
    request(port, "POST", "/execute", Some(&bytes))
}

#[allow(dead_code)]
pub fn get(port: u16, path: &str) -> Response {
    request(port, "GET", path, None)
}

pub fn parse_response(raw: &[u8]) -> Response {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("no header terminator in response");
    let head = String::from_utf8_lossy(&raw[..end]).into_owned();
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .expect("status line");
    let headers = parse_fields(lines);
    let rest = &raw[end + 4..];
    let chunked = find(&headers, "transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let (body, trailers) = if chunked {
        dechunk(rest)
    } else {
        (rest.to_vec(), Vec::new())
    };
    Response {
        status,
        headers,
        body,
        trailers,
    }
}

fn parse_fields<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<(String, String)> {
    lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Decode a chunked body; returns the payload and any trailer fields.
pub fn dechunk(mut raw: &[u8]) -> (Vec<u8>, Vec<(String, String)>) {
    let mut body = Vec::new();
    loop {
        let Some(eol) = raw.windows(2).position(|w| w == b"\r\n") else {
            return (body, Vec::new());
        };
        let size_line = String::from_utf8_lossy(&raw[..eol]).into_owned();
        let size = usize::from_str_radix(size_line.trim(), 16).expect("chunk size");
        raw = &raw[eol + 2..];
        if size == 0 {
            let trailer_text = String::from_utf8_lossy(raw).into_owned();
            let trailers = parse_fields(trailer_text.split("\r\n"));
            return (body, trailers);
        }
        body.extend_from_slice(&raw[..size]);
        raw = &raw[size + 2..];
    }
}

/// Whether `bin` is on PATH.
#[allow(dead_code)]
pub fn have(bin: &str) -> bool {
    which::which(bin).is_ok()
}

/// Write an executable script into `dir`.
#[allow(dead_code)]
pub fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
    }
    path
}
