//! The live wrapper around one spawned protocol process.
//!
//! A `Handle` owns the lazily-resolved pid and two append-only output
//! buffers fed by background reader tasks; the child itself moves into a
//! dedicated waiter task at spawn time that publishes the terminal exit code
//! through a watch channel. That keeps `await_status` callers off any lock
//! the rest of the handle needs: `term()` and output snapshots stay
//! non-blocking while a status wait is in flight. A handle dropped with the
//! child still alive kills it.

use crate::platform::Platform;
use crate::poll::{self, POLL_ATTEMPTS, POLL_INTERVAL};
use crate::signals::send_signal;
use crate::Result;
use eyre::eyre;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use once_cell::sync::OnceCell;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// How long the waiter task waits for the stream readers to observe EOF
/// after the child exits. A surviving descendant can keep the write end of
/// the pipe open past the child's own death.
const READER_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Terminal outcome published by the waiter task: `None` while the child is
/// alive, then exactly one exit code (or wait-failure message) forever.
type ExitSlot = Option<std::result::Result<i32, String>>;

/// Single-writer, multi-reader append-only capture of one output stream.
///
/// The background reader task is the only writer; snapshots decode the whole
/// accumulated byte buffer so readers always observe a consistent prefix of
/// what the child has emitted, never a torn read.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    fn append(&self, chunk: &[u8]) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
    }

    /// Snapshot of everything captured so far. Never blocks on the child.
    pub fn snapshot(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn drain_into(
    buffer: OutputBuffer,
    mut stream: impl AsyncRead + Unpin + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer.append(&chunk[..n]),
                Err(e) => {
                    debug!("output stream closed with error: {}", e);
                    break;
                }
            }
        }
    })
}

/// Waits for the child to exit, drains the stream readers, and publishes the
/// terminal exit code exactly once. Owning the child here means no caller
/// ever holds a lock across the wait.
fn spawn_waiter(
    protocol: String,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
) -> watch::Receiver<ExitSlot> {
    let (tx, rx) = watch::channel(None);
    tokio::spawn(async move {
        let outcome = match child.wait().await {
            Ok(status) => Ok(exit_code(status)),
            Err(e) => Err(e.to_string()),
        };
        for reader in readers {
            if timeout(READER_DRAIN_GRACE, reader).await.is_err() {
                debug!(
                    "output reader for {} still draining after exit, not waiting further",
                    protocol
                );
            }
        }
        let _ = tx.send(Some(outcome));
    });
    rx
}

/// Maps an exit status to the harness's integer contract: the plain exit
/// code when the process exited normally, otherwise 128 plus the number of
/// the terminating signal (so SIGTERM yields 143).
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// One spawned protocol process and its captured state.
pub struct Handle {
    platform: Platform,
    protocol: String,
    /// Pid reported by the spawn primitive, used only for teardown. The
    /// observable pid of the protocol still goes through the platform's
    /// resolver.
    launch_pid: Option<Pid>,
    status_rx: watch::Receiver<ExitSlot>,
    exit_code: OnceCell<i32>,
    pid: OnceCell<Pid>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

impl Handle {
    pub(crate) async fn spawn(platform: &Platform, protocol: &str, args: &[&str]) -> Result<Self> {
        let spec = platform.spec(protocol, args);
        info!(
            "launching protocol {} via {} {:?}",
            protocol,
            spec.program.display(),
            spec.args
        );

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        // Covers runtime shutdown tearing down the waiter task with the
        // child still alive.
        command.kill_on_drop(true);

        let mut child = command.spawn()?;
        let launch_pid = child.id().map(|id| Pid::from_raw(id as i32));

        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();
        let mut readers = Vec::new();
        if let Some(out) = child.stdout.take() {
            readers.push(drain_into(stdout.clone(), out));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(drain_into(stderr.clone(), err));
        }

        let status_rx = spawn_waiter(protocol.to_string(), child, readers);

        Ok(Self {
            platform: platform.clone(),
            protocol: protocol.to_string(),
            launch_pid,
            status_rx,
            exit_code: OnceCell::new(),
            pid: OnceCell::new(),
            stdout,
            stderr,
        })
    }

    /// The logical name this handle was launched for.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Whether the waiter task has published the terminal exit code yet.
    fn exited(&self) -> bool {
        self.exit_code.get().is_some() || self.status_rx.borrow().is_some()
    }

    /// Awaits process exit and returns its exit code. Idempotent: the first
    /// call caches the terminal value and repeated calls return it without
    /// waiting again. Safe to call from several tasks at once; all observe
    /// the same code. Output snapshots taken after this returns are complete
    /// (the waiter joins the stream readers within a bounded grace first).
    pub async fn await_status(&self) -> Result<i32> {
        if let Some(code) = self.exit_code.get() {
            return Ok(*code);
        }
        let mut rx = self.status_rx.clone();
        let outcome = rx.wait_for(|slot| slot.is_some()).await?.clone();
        let code = match outcome {
            Some(Ok(code)) => code,
            Some(Err(msg)) => return Err(eyre!("waiting for {} failed: {}", self.protocol, msg)),
            None => return Err(eyre!("exit status channel for {} closed early", self.protocol)),
        };
        if self.exit_code.set(code).is_ok() {
            info!("protocol {} exited with code {}", self.protocol, code);
        }
        Ok(code)
    }

    /// Best-effort forceful kill, delivered to the pid recorded at spawn.
    /// Never blocks: callers follow with `await_status` to observe the
    /// resulting code. A no-op once the process has already exited.
    pub fn term(&self) {
        if self.exited() {
            debug!("{} already exited, kill skipped", self.protocol);
            return;
        }
        match self.launch_pid {
            Some(pid) => send_signal(pid, Signal::SIGKILL),
            None => debug!("no launch pid recorded for {}, kill skipped", self.protocol),
        }
    }

    /// Non-blocking snapshot of the captured standard output.
    pub fn stdout(&self) -> String {
        self.stdout.snapshot()
    }

    /// Non-blocking snapshot of the captured standard error.
    pub fn stderr(&self) -> String {
        self.stderr.snapshot()
    }

    /// Resolves the OS pid through the platform's listing strategy, caching
    /// the first successful resolution so the same process is identified for
    /// the rest of the handle's lifetime. May legitimately return `None`
    /// right after launch; poll via `await_pid`.
    pub async fn pid(&self) -> Result<Option<Pid>> {
        if let Some(pid) = self.pid.get() {
            return Ok(Some(*pid));
        }
        match self.platform.pid(&self.protocol).await? {
            Some(pid) => Ok(Some(*self.pid.get_or_init(|| pid))),
            None => {
                debug!("pid for {} not resolved yet", self.protocol);
                Ok(None)
            }
        }
    }

    /// Bounded-retry pid resolution with the standard polling budget.
    pub async fn await_pid(&self) -> Result<Option<Pid>> {
        for _ in 0..POLL_ATTEMPTS {
            if let Some(pid) = self.pid().await? {
                return Ok(Some(pid));
            }
            sleep(POLL_INTERVAL).await;
        }
        Ok(None)
    }

    /// Polls the stdout snapshot for a marker substring with the standard
    /// budget. Returns false silently when the budget runs out; the caller's
    /// next assertion is the failure signal.
    pub async fn await_marker(&self, marker: &str) -> bool {
        poll::poll_until(POLL_INTERVAL, POLL_ATTEMPTS, || {
            self.stdout().contains(marker)
        })
        .await
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // Emergency cleanup for a handle abandoned with its child alive; the
        // waiter task still reaps the exit afterwards.
        if !self.exited() {
            if let Some(pid) = self.launch_pid {
                debug!(
                    "handle for {} dropped with child alive, killing pid {}",
                    self.protocol, pid
                );
                send_signal(pid, Signal::SIGKILL);
            }
        }
    }
}
