//! Execution engine and its HTTP surface.
//!
//! Leaf-first: `resolver` and `request` feed `materialize` (backed by `tempfiles`);
//! `runner` drives `stream`; `download` closes a successful run and serves fetches;
//! `http`, `static_files` and `server` are the connection plumbing around them.

pub mod download;
pub mod http;
pub mod materialize;
pub mod request;
pub mod resolver;
pub mod runner;
pub mod server;
pub mod static_files;
pub mod stream;
pub mod tempfiles;

pub use download::{DownloadEntry, DownloadManifest, DOWNLOAD_SENTINEL};
pub use materialize::{ArgumentMaterializer, MaterializedArgs, TempFileBinding};
pub use request::{ArgSpec, ExecutionRequest, TempFilePlaceholder, TMP_FILE_PATH};
pub use resolver::CommandResolver;
pub use runner::{ProcessOutcome, ProcessRunner, RunReport, RunningProcess, TIMEOUT_SENTINEL};
pub use server::{start_gateway, Gateway, GatewayHandle};
pub use stream::{ChunkedBody, OutputSink};
pub use tempfiles::{TempFileAllocator, TEMP_FILE_PREFIX};
