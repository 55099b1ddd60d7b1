//! Error mapping guide:
//! - Validation, malformed JSON and unresolved commands are client errors (400).
//! - Spawn failures, temp file allocation and other I/O failures are server errors (500).
//! - A timed-out run is not an error: it is reported inline on an already committed 200 stream.
//! - Error bodies are plain text; only the success path carries JSON (the download manifest).
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors resolved at the request boundary before (or instead of) streaming output.
#[derive(Debug)]
pub enum GatewayError {
    /// Missing/empty command or a request body with the wrong shape.
    Validation(String),
    /// Body is not valid JSON.
    InvalidJson(String),
    /// Neither the executable search path nor the scripts directory has the command.
    CommandNotFound(String),
    /// Resolution succeeded but the OS refused to start the process.
    Spawn { program: PathBuf, source: io::Error },
    /// A placeholder argument could not be materialized.
    TempFile(io::Error),
    Io(io::Error),
}

impl GatewayError {
    /// HTTP status line used when this error is answered.
    pub fn status_line(&self) -> &'static str {
        match self {
            GatewayError::Validation(_)
            | GatewayError::InvalidJson(_)
            | GatewayError::CommandNotFound(_) => "400 Bad Request",
            GatewayError::Spawn { .. } | GatewayError::TempFile(_) | GatewayError::Io(_) => {
                "500 Internal Server Error"
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_)
            | GatewayError::InvalidJson(_)
            | GatewayError::CommandNotFound(_) => 400,
            GatewayError::Spawn { .. } | GatewayError::TempFile(_) | GatewayError::Io(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Plain-text response body. Server errors are prefixed the same way for every variant.
    pub fn body(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            format!("An error occurred: {self}")
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Validation(msg) => f.write_str(msg),
            GatewayError::InvalidJson(msg) => write!(f, "Invalid JSON: {msg}"),
            GatewayError::CommandNotFound(name) => write!(f, "Command not found: {name}"),
            GatewayError::Spawn { program, source } => {
                write!(f, "failed to spawn {}: {source}", program.display())
            }
            GatewayError::TempFile(e) => write!(f, "temp file allocation failed: {e}"),
            GatewayError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Spawn { source, .. } => Some(source),
            GatewayError::TempFile(e) | GatewayError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GatewayError {
    fn from(e: io::Error) -> Self {
        GatewayError::Io(e)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidJson(e.to_string())
    }
}

/// Map an io::Error to a process exit code for the binary:
/// - 127 for NotFound
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}
