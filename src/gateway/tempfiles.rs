/*!
Shared temp directory service.

Owns the directory and the naming scheme for materialized temp files. Files are created
empty with unique opaque names and are never mutated or removed by the gateway; they
outlive the request that created them so a later download can read them.
*/

use std::io;
use std::path::{Path, PathBuf};

/// Prefix for every allocated file; downloads are only served for names carrying it.
pub const TEMP_FILE_PREFIX: &str = "ecui-";

#[derive(Debug, Clone)]
pub struct TempFileAllocator {
    dir: PathBuf,
}

impl TempFileAllocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new, uniquely named, empty file and return its absolute path.
    pub fn allocate(&self) -> io::Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(&self.dir)?;
        let (_handle, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }

    /// Look up a previously allocated file by its opaque name.
    ///
    /// Only plain basenames with the allocator prefix are accepted, so a request can never
    /// address anything outside the temp directory or a file the gateway did not create.
    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        if !is_allocated_name(name) {
            return None;
        }
        let path = self.dir.join(name);
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }
}

/// Opaque name of an allocated file (the last path component).
pub fn opaque_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_allocated_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    // Names end up in a quoted Content-Disposition value.
    if name.contains(['/', '\\', '"']) || name.chars().any(char::is_control) {
        return false;
    }
    // A single normal component; rejects drive prefixes and similar on Windows.
    let mut comps = Path::new(name).components();
    let single = matches!(
        (comps.next(), comps.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    single && name.starts_with(TEMP_FILE_PREFIX)
}
