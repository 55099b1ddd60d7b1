/*!
Process runner: spawn, stream, time out, kill, wait.

Standard output and standard error share one pipe, so the client sees them interleaved
exactly as the child wrote them. Three parties cooperate on a run:
- a reader thread drains the pipe into a bounded channel
- a watcher thread owns the child, reaps it and kills it at the deadline
- the request thread forwards chunks to the client

The deadline never depends on the client keeping up, and exit is detected without
waiting for the pipe to close.

On timeout only the direct child is killed. Descendants that inherited the pipe keep it
open; after a short grace the runner stops waiting for them and leaves the reader thread
detached.
*/

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use super::stream::OutputSink;
use crate::errors::GatewayError;

/// Longest piece forwarded at once when a line has no newline yet.
pub const MAX_CHUNK: usize = 8 * 1024;

/// Chunks buffered between the pipe reader and the client; a full backlog stalls the child.
const OUTPUT_BACKLOG: usize = 256;

/// How long to keep draining once the child is gone before giving up on the pipe.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Exit polling interval of the watcher and the forwarding loop.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Exit code reported for a run that hit the timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

pub const TIMEOUT_SENTINEL: &str = "---TIMEOUT---";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(i32),
    /// Terminated by a signal the gateway did not send.
    Signaled(i32),
    TimedOut,
}

impl ProcessOutcome {
    /// Only a clean zero exit unlocks downloads.
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Exited(0))
    }

    /// Shell-style exit code for the `X-Exit-Code` trailer.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessOutcome::Exited(code) => *code,
            ProcessOutcome::Signaled(sig) => 128 + sig,
            ProcessOutcome::TimedOut => TIMEOUT_EXIT_CODE,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessOutcome::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ProcessOutcome::Signaled(sig);
            }
        }
        ProcessOutcome::Exited(1)
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::Exited(code) => write!(f, "exit {code}"),
            ProcessOutcome::Signaled(sig) => write!(f, "signal {}", signal_name(*sig)),
            ProcessOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

#[cfg(unix)]
fn signal_name(sig: i32) -> String {
    nix::sys::signal::Signal::try_from(sig)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| sig.to_string())
}

#[cfg(not(unix))]
fn signal_name(sig: i32) -> String {
    sig.to_string()
}

/// Body text appended after the output of a timed-out run.
pub fn timeout_notice(timeout: Duration) -> String {
    format!(
        "\n{TIMEOUT_SENTINEL}\nCommand timed out after {}s and was killed\n",
        timeout.as_secs()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: ProcessOutcome,
    pub duration: Duration,
    pub bytes_forwarded: u64,
    /// The sink failed at some point; nothing after that was delivered.
    pub client_gone: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start `program` with `argv`; the wall-clock budget starts now.
    ///
    /// Both helper threads exist before the child does, so a failed thread spawn never
    /// leaves an unsupervised process behind.
    pub fn spawn(&self, program: &Path, argv: &[String]) -> Result<RunningProcess, GatewayError> {
        let (out_rx, out_tx) = io::pipe()?;

        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(OUTPUT_BACKLOG);
        let reader = std::thread::Builder::new()
            .name("ecui-out".into())
            .spawn(move || pump(out_rx, tx))?;

        let (handoff_tx, handoff_rx) = mpsc::channel::<(Child, Instant)>();
        let (exit_tx, exit_rx) = mpsc::channel::<Exit>();
        let abort = Arc::new(AtomicBool::new(false));
        let abort_cl = abort.clone();
        let program_cl = program.to_path_buf();
        let timeout = self.timeout;
        std::thread::Builder::new()
            .name("ecui-wait".into())
            .spawn(move || watch(handoff_rx, timeout, abort_cl, exit_tx, program_cl))?;

        let child = {
            let mut cmd = Command::new(program);
            cmd.args(argv)
                .stdin(Stdio::null())
                .stdout(out_tx.try_clone()?)
                .stderr(out_tx);
            let child = cmd.spawn().map_err(|source| GatewayError::Spawn {
                program: program.to_path_buf(),
                source,
            })?;
            // Dropping `cmd` closes the parent's copies of the write end.
            child
        };
        let started = Instant::now();
        let pid = child.id();
        handoff_tx
            .send((child, started + self.timeout))
            .map_err(|_| io::Error::other("exit watcher is gone"))?;

        Ok(RunningProcess {
            pid,
            rx,
            exit_rx,
            abort,
            reader: Some(reader),
            started,
            timeout: self.timeout,
            program: program.to_path_buf(),
        })
    }
}

/// How the watcher saw the child end.
enum Exit {
    Status(ExitStatus),
    TimedOut,
    Failed(io::Error),
}

/// Own the child: reap it when it exits, kill it at the deadline or on abort.
///
/// Runs on its own thread so the deadline holds even while the request thread is stuck
/// writing to a slow client.
fn watch(
    handoff: Receiver<(Child, Instant)>,
    timeout: Duration,
    abort: Arc<AtomicBool>,
    done: Sender<Exit>,
    program: PathBuf,
) {
    let Ok((mut child, deadline)) = handoff.recv() else {
        return;
    };
    let exit = loop {
        if abort.load(Ordering::SeqCst) {
            kill_and_reap(&mut child);
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::warn!(
                pid = child.id(),
                program = %program.display(),
                timeout_secs = timeout.as_secs(),
                "execution timed out; killing process"
            );
            kill_and_reap(&mut child);
            break Exit::TimedOut;
        }
        match child.wait_timeout(remaining.min(WAIT_POLL)) {
            Ok(Some(status)) => break Exit::Status(status),
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(&mut child);
                break Exit::Failed(e);
            }
        }
    };
    let _ = done.send(exit);
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

pub struct RunningProcess {
    pid: u32,
    rx: Receiver<Vec<u8>>,
    exit_rx: Receiver<Exit>,
    abort: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    started: Instant,
    timeout: Duration,
    program: PathBuf,
}

impl RunningProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Forward output to `sink` until the child is gone, then report how it ended.
    ///
    /// Exit is detected independently of the pipe: a child that exits while a descendant
    /// still holds its output open is reported by its own status, after a bounded drain.
    /// Every chunk produced before termination has been offered to the sink when this
    /// returns.
    pub fn drive(mut self, sink: &mut dyn OutputSink) -> io::Result<RunReport> {
        let mut fwd = Forwarder::new(sink);

        let exit = loop {
            match self.exit_rx.try_recv() {
                Ok(exit) => break exit,
                Err(TryRecvError::Disconnected) => break Exit::Failed(watcher_gone()),
                Err(TryRecvError::Empty) => {}
            }
            match self.rx.recv_timeout(WAIT_POLL) {
                Ok(chunk) => fwd.forward(&chunk),
                Err(RecvTimeoutError::Timeout) => {}
                // Pipe closed; the watcher answers by the deadline at the latest.
                Err(RecvTimeoutError::Disconnected) => {
                    break self
                        .exit_rx
                        .recv()
                        .unwrap_or_else(|_| Exit::Failed(watcher_gone()))
                }
            }
        };

        let outcome = match exit {
            Exit::Status(status) => ProcessOutcome::from_status(status),
            Exit::TimedOut => {
                tracing::debug!(
                    program = %self.program.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "draining output of killed process"
                );
                ProcessOutcome::TimedOut
            }
            Exit::Failed(e) => return Err(e),
        };
        self.drain(&mut fwd);

        Ok(RunReport {
            outcome,
            duration: self.started.elapsed(),
            bytes_forwarded: fwd.bytes,
            client_gone: fwd.gone,
        })
    }

    /// Kill and reap without forwarding anything (the response could not even start).
    pub fn abort(mut self) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self.reader.take();
    }

    // Forward what is still buffered once the child is gone. Descendants may keep the pipe
    // open; after the grace the reader is detached.
    fn drain(&mut self, fwd: &mut Forwarder<'_>) {
        let grace_end = Instant::now() + DRAIN_GRACE;
        loop {
            let remaining = grace_end.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => fwd.forward(&chunk),
                Err(RecvTimeoutError::Disconnected) => {
                    self.join_reader();
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        program = %self.program.display(),
                        "descendant processes still hold the output pipe; detaching reader"
                    );
                    let _ = self.reader.take();
                    return;
                }
            }
        }
    }

    fn join_reader(&mut self) {
        if let Some(h) = self.reader.take() {
            let _ = h.join();
        }
    }
}

fn watcher_gone() -> io::Error {
    io::Error::other("exit watcher ended without a status")
}

struct Forwarder<'a> {
    sink: &'a mut dyn OutputSink,
    bytes: u64,
    gone: bool,
}

impl<'a> Forwarder<'a> {
    fn new(sink: &'a mut dyn OutputSink) -> Self {
        Self {
            sink,
            bytes: 0,
            gone: false,
        }
    }

    // After the first failure keep draining the pipe but stop writing.
    fn forward(&mut self, chunk: &[u8]) {
        if self.gone {
            return;
        }
        match self.sink.forward(chunk) {
            Ok(()) => self.bytes += chunk.len() as u64,
            Err(e) => {
                tracing::warn!("client write failed, discarding further output: {e}");
                self.gone = true;
            }
        }
    }
}

/// Read merged output and send it line by line (or in `MAX_CHUNK` pieces).
fn pump<R: Read>(src: R, tx: SyncSender<Vec<u8>>) {
    let mut reader = BufReader::with_capacity(MAX_CHUNK, src);
    let mut pending: Vec<u8> = Vec::with_capacity(256);
    loop {
        let buf = match reader.fill_buf() {
            Ok([]) => break,
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        let room = MAX_CHUNK - pending.len();
        let want = match buf.iter().position(|&b| b == b'\n') {
            Some(i) => i + 1,
            None => buf.len(),
        };
        let take = want.min(room);
        pending.extend_from_slice(&buf[..take]);
        reader.consume(take);

        if pending.ends_with(b"\n") || pending.len() >= MAX_CHUNK {
            if tx.send(std::mem::take(&mut pending)).is_err() {
                return;
            }
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(pending);
    }
}
