/*!
Optional static file serving for the UI bundled next to the gateway.
*/

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::http::respond_plain;

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a request path below the root. `..` anywhere rejects the whole path.
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(url_path).ok()?;
        let mut path = self.root.clone();
        for seg in decoded.split('/') {
            match seg {
                "" | "." => continue,
                ".." => return None,
                s if s.contains(['\\', '\0']) => return None,
                s => path.push(s),
            }
        }
        if path.is_dir() {
            path.push("index.html");
        }
        path.is_file().then_some(path)
    }

    /// Answer a GET (or HEAD when `head_only`). Returns the HTTP status sent.
    pub fn serve<W: Write>(&self, w: &mut W, url_path: &str, head_only: bool) -> io::Result<u16> {
        let Some(path) = self.resolve(url_path) else {
            respond_plain(w, "404 Not Found", "File not found")?;
            return Ok(404);
        };
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(_) => {
                respond_plain(w, "404 Not Found", "File not found")?;
                return Ok(404);
            }
        };
        let len = file.metadata()?.len();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
            content_type_for(&path)
        );
        w.write_all(head.as_bytes())?;
        if !head_only {
            io::copy(&mut file, w)?;
        }
        w.flush()?;
        Ok(200)
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" | "md" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> (tempfile::TempDir, StaticFiles) {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("index.html"), "<h1>ui</h1>").unwrap();
        std::fs::create_dir(td.path().join("assets")).unwrap();
        std::fs::write(td.path().join("assets").join("app.js"), "let x = 1;").unwrap();
        let files = StaticFiles::new(td.path());
        (td, files)
    }

    #[test]
    fn root_maps_to_index() {
        let (td, files) = site();
        assert_eq!(files.resolve("/"), Some(td.path().join("index.html")));
        assert_eq!(
            files.resolve("/assets/app.js"),
            Some(td.path().join("assets").join("app.js"))
        );
    }

    #[test]
    fn traversal_is_rejected() {
        let (_td, files) = site();
        for p in ["/../etc/passwd", "/assets/../index.html", "/%2e%2e/secret", "/a\\b"] {
            assert_eq!(files.resolve(p), None, "{p}");
        }
    }

    #[test]
    fn serves_with_content_type_and_head() {
        let (_td, files) = site();
        let mut out = Vec::new();
        assert_eq!(files.serve(&mut out, "/assets/app.js", false).unwrap(), 200);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Type: text/javascript; charset=utf-8\r\n"));
        assert!(text.ends_with("let x = 1;"));

        let mut out = Vec::new();
        assert_eq!(files.serve(&mut out, "/", true).unwrap(), 200);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn missing_is_404() {
        let (_td, files) = site();
        let mut out = Vec::new();
        assert_eq!(files.serve(&mut out, "/nope.css", false).unwrap(), 404);
    }
}
