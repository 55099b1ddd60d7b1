/*!
Listener and per-connection dispatcher.

A background thread polls a non-blocking `TcpListener` and hands each accepted stream to
its own thread. Requests share nothing mutable except the temp directory and the
filesystem, so connections are fully independent.

`/execute` ordering:
1. decode, resolve, materialize, spawn; any failure answers 400/500 and nothing streams
2. commit `200` and forward output as it arrives
3. timeout marker or download manifest, then the `X-Exit-Code` trailer
*/

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::download::{serve_download, DownloadManifest};
use super::http::{self, classify_endpoint, respond_plain, respond_plain_with, Endpoint, Method};
use super::materialize::ArgumentMaterializer;
use super::request::ExecutionRequest;
use super::resolver::CommandResolver;
use super::runner::{timeout_notice, ProcessOutcome, ProcessRunner};
use super::static_files::StaticFiles;
use super::stream::ChunkedBody;
use super::tempfiles::TempFileAllocator;
use crate::config::GatewayConfig;
use crate::errors::GatewayError;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// A client that accepts no bytes for this long is treated as gone.
const RESPONSE_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Request handling state shared by all connection threads.
#[derive(Debug, Clone)]
pub struct Gateway {
    resolver: CommandResolver,
    allocator: TempFileAllocator,
    runner: ProcessRunner,
    static_files: Option<StaticFiles>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            resolver: CommandResolver::new(&config.scripts_dir),
            allocator: TempFileAllocator::new(&config.temp_dir),
            runner: ProcessRunner::new(config.timeout),
            static_files: config.static_dir.as_ref().map(StaticFiles::new),
        }
    }

    /// Serve exactly one request on `stream`.
    pub fn handle_connection<S: Read + Write>(&self, stream: &mut S, peer: &str) {
        let req = match http::read_http_request(stream) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(peer, "unreadable request: {e}");
                let (status, body) = match e.kind() {
                    io::ErrorKind::InvalidInput => (
                        "431 Request Header Fields Too Large",
                        "Request headers too large",
                    ),
                    io::ErrorKind::FileTooLarge => ("413 Payload Too Large", "Request body too large"),
                    _ => ("400 Bad Request", "Bad request"),
                };
                let _ = respond_plain(stream, status, body);
                return;
            }
        };
        tracing::info!(peer, method = req.method.as_str(), path = %req.path, "request");

        let res = match classify_endpoint(&req.path) {
            Some(ep) if !ep.accepts(&req.method) => respond_plain_with(
                stream,
                "405 Method Not Allowed",
                &[("Allow", ep.allow())],
                "Method not allowed",
            ),
            Some(Endpoint::Execute) => {
                self.execute(stream, &req.body);
                Ok(())
            }
            Some(Endpoint::Download(name)) => {
                serve_download(stream, &self.allocator, &name).map(|_| ())
            }
            None => match (&self.static_files, &req.method) {
                (Some(files), Method::Get | Method::Head) => files
                    .serve(stream, &req.path, req.method == Method::Head)
                    .map(|_| ()),
                _ => respond_plain(stream, "404 Not Found", "Endpoint not found"),
            },
        };
        if let Err(e) = res {
            tracing::debug!(peer, "response write failed: {e}");
        }
    }

    fn execute<S: Read + Write>(&self, stream: &mut S, body: &[u8]) {
        let prepared = ExecutionRequest::from_json_bytes(body).and_then(|req| {
            tracing::debug!(
                command = %req.command,
                args = req.args.len(),
                placeholders = req.placeholder_count(),
                "decoded execution request"
            );
            let program = self.resolver.resolve(&req.command)?;
            let args = ArgumentMaterializer::new(&self.allocator).materialize(&req.args)?;
            let process = self.runner.spawn(&program, &args.argv)?;
            tracing::info!(
                pid = process.pid(),
                program = %program.display(),
                argc = args.argv.len(),
                temp_files = args.bindings.len(),
                "spawned"
            );
            Ok((process, args.bindings))
        });
        let (process, bindings) = match prepared {
            Ok(p) => p,
            Err(e) => {
                respond_error(stream, &e);
                return;
            }
        };

        let mut out = match ChunkedBody::start(stream) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!("client gone before output started: {e}");
                process.abort();
                return;
            }
        };

        let report = match process.drive(&mut out) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("waiting for child failed: {e}");
                return;
            }
        };
        tracing::info!(
            outcome = %report.outcome,
            duration_ms = report.duration.as_millis() as u64,
            bytes = report.bytes_forwarded,
            "finished"
        );
        if report.client_gone {
            return;
        }

        let tail = match report.outcome {
            ProcessOutcome::TimedOut => Some(timeout_notice(self.runner.timeout())),
            outcome => match DownloadManifest::for_run(&outcome, &bindings) {
                Some(m) => match m.to_trailer() {
                    Ok(t) => Some(t),
                    Err(e) => {
                        tracing::error!("manifest serialization failed: {e}");
                        None
                    }
                },
                None => None,
            },
        };
        let res = match tail {
            Some(t) => out.write_chunk(t.as_bytes()),
            None => Ok(()),
        };
        let body_bytes = out.bytes_written();
        match res.and_then(|_| out.finish(report.outcome.exit_code())) {
            Ok(()) => tracing::debug!(body_bytes, "response complete"),
            Err(e) => tracing::warn!("client gone before trailer: {e}"),
        }
    }
}

fn respond_error<W: Write>(w: &mut W, err: &GatewayError) {
    if err.is_client_error() {
        tracing::info!("rejected: {err}");
    } else {
        tracing::error!("execution failed: {err}");
    }
    let _ = respond_plain(w, err.status_line(), &err.body());
}

/// Running listener. Dropping the handle leaves the gateway running.
pub struct GatewayHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl GatewayHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL reachable from this host.
    pub fn url(&self) -> String {
        let host = if self.addr.ip().is_unspecified() {
            "127.0.0.1".to_string()
        } else if self.addr.is_ipv6() {
            format!("[{}]", self.addr.ip())
        } else {
            self.addr.ip().to_string()
        };
        format!("http://{host}:{}", self.addr.port())
    }

    /// Stop accepting and wait for the accept thread. In-flight requests finish on their own.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.thread.join();
    }

    /// Block until the accept loop ends.
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Validate `config`, bind and start serving in the background.
pub fn start_gateway(config: GatewayConfig) -> io::Result<GatewayHandle> {
    config.validate()?;
    let listener = TcpListener::bind(config.bind_addr())
        .map_err(|e| io::Error::new(e.kind(), format!("bind {} failed: {e}", config.bind_addr())))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let gateway = Arc::new(Gateway::new(&config));
    let running = Arc::new(AtomicBool::new(true));
    let running_cl = running.clone();

    tracing::info!(
        %addr,
        scripts_dir = %gateway.resolver.scripts_dir().display(),
        temp_dir = %gateway.allocator.dir().display(),
        timeout = %humantime::format_duration(config.timeout),
        "gateway listening"
    );

    let thread = std::thread::Builder::new()
        .name("ecui-accept".into())
        .spawn(move || {
            accept_loop(listener, gateway, running_cl);
            tracing::info!("gateway stopped");
        })?;

    Ok(GatewayHandle {
        addr,
        running,
        thread,
    })
}

fn accept_loop(listener: TcpListener, gateway: Arc<Gateway>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => {
                tracing::warn!("accept error: {e}");
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
        };
        let gw = gateway.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("ecui-conn-{peer}"))
            .spawn(move || serve_stream(&gw, stream, peer));
        if let Err(e) = spawned {
            tracing::error!(%peer, "cannot start connection thread: {e}");
        }
    }
}

fn serve_stream(gateway: &Gateway, mut stream: TcpStream, peer: SocketAddr) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT));
    let _ = stream.set_write_timeout(Some(RESPONSE_WRITE_TIMEOUT));
    let _ = stream.set_nodelay(true);
    gateway.handle_connection(&mut stream, &peer.to_string());
    let _ = stream.shutdown(std::net::Shutdown::Write);
}
