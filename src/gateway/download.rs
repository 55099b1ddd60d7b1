/*!
Download handoff.

Phase 1 runs at the end of `/execute`: a successful run with at least one
`download = true` binding appends the sentinel and a JSON manifest as the last body
content. Phase 2 is an unrelated `GET /download/<name>` that streams the file back.
URLs carry only the opaque on-disk name; the display name is advisory.
*/

use std::fs::File;
use std::io::{self, Write};

use serde::Serialize;

use super::http::respond_plain;
use super::materialize::TempFileBinding;
use super::runner::ProcessOutcome;
use super::tempfiles::{opaque_name, TempFileAllocator};

pub const DOWNLOAD_SENTINEL: &str = "---DOWNLOAD-INFO---";
pub const DOWNLOAD_ROUTE: &str = "/download/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadEntry {
    pub download_url: String,
    pub download_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadManifest {
    pub temp_files: Vec<DownloadEntry>,
}

impl DownloadManifest {
    /// Manifest for a finished run, or `None` when nothing may be advertised.
    pub fn for_run(outcome: &ProcessOutcome, bindings: &[TempFileBinding]) -> Option<Self> {
        if !outcome.is_success() {
            return None;
        }
        let temp_files: Vec<DownloadEntry> = bindings
            .iter()
            .filter(|b| b.download)
            .map(|b| DownloadEntry {
                download_url: download_url(&opaque_name(&b.path)),
                download_name: b.download_name.clone(),
            })
            .collect();
        if temp_files.is_empty() {
            None
        } else {
            Some(Self { temp_files })
        }
    }

    /// `\n---DOWNLOAD-INFO---\n<json>`, written once as the final body content.
    pub fn to_trailer(&self) -> serde_json::Result<String> {
        Ok(format!(
            "\n{DOWNLOAD_SENTINEL}\n{}",
            serde_json::to_string(self)?
        ))
    }
}

pub fn download_url(name: &str) -> String {
    format!("{DOWNLOAD_ROUTE}{}", urlencoding::encode(name))
}

/// Answer `GET /download/<raw_name>`. Returns the HTTP status sent.
///
/// Unknown, foreign and malformed names all look like a missing file. Nothing is
/// deleted after a successful fetch.
pub fn serve_download<W: Write>(
    w: &mut W,
    allocator: &TempFileAllocator,
    raw_name: &str,
) -> io::Result<u16> {
    let found = urlencoding::decode(raw_name)
        .ok()
        .and_then(|name| allocator.lookup(&name).map(|p| (name.into_owned(), p)));
    let Some((name, path)) = found else {
        tracing::info!(name = raw_name, "download miss");
        respond_plain(w, "404 Not Found", "File not found")?;
        return Ok(404);
    };

    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), "download open failed: {e}");
            respond_plain(w, "404 Not Found", "File not found")?;
            return Ok(404);
        }
    };
    let len = file.metadata()?.len();
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Disposition: attachment; filename=\"{name}\"\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n"
    );
    w.write_all(head.as_bytes())?;
    let sent = io::copy(&mut file, w)?;
    w.flush()?;
    tracing::info!(name = %name, bytes = sent, "download served");
    Ok(200)
}
