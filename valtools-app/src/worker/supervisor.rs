//! WorkerSupervisor - runs one external worker at a time and resolves its
//! single result.
//!
//! The active-worker slot is written in exactly three places: `reserve`
//! (at the start of `invoke`), the slot guard's drop (when that invocation
//! ends on any path), and `cancel`. A second `invoke` while the slot is held
//! fails with `Busy` instead of replacing the running process.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::worker::error::{WorkerError, WorkerResult};
use crate::worker::events::StatusEventBus;
use crate::worker::invocation::{ResultMode, WorkerInvocation};
use crate::worker::spool::{prepare_payload, DEFAULT_SPOOL_THRESHOLD};

/// Executable plus the arguments that precede every invocation
/// (typically an interpreter and a script path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: String,
    #[serde(default)]
    pub base_args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }
}

struct ActiveWorker {
    id: Uuid,
    cancel_tx: oneshot::Sender<()>,
}

/// Releases the active slot when an invocation ends, unless `cancel` has
/// already released it (and possibly a new invocation now owns it).
struct SlotGuard<'a> {
    active: &'a Mutex<Option<ActiveWorker>>,
    id: Uuid,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut active = lock_slot(self.active);
        if active.as_ref().map(|worker| worker.id) == Some(self.id) {
            *active = None;
        }
    }
}

fn lock_slot(slot: &Mutex<Option<ActiveWorker>>) -> MutexGuard<'_, Option<ActiveWorker>> {
    // The slot holds no invariants a panicking holder could break
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct StdoutCapture {
    /// Everything the worker wrote, verbatim.
    raw: String,
    /// Lines that were not status records.
    result: String,
}

pub struct WorkerSupervisor {
    command: WorkerCommand,
    events: StatusEventBus,
    spool_threshold: usize,
    spool_dir: Option<PathBuf>,
    active: Mutex<Option<ActiveWorker>>,
}

impl WorkerSupervisor {
    pub fn new(command: WorkerCommand, events: StatusEventBus) -> Self {
        Self {
            command,
            events,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            spool_dir: None,
            active: Mutex::new(None),
        }
    }

    /// Payloads whose JSON text is longer than `bytes` go through a temp file.
    pub fn with_spool_threshold(mut self, bytes: usize) -> Self {
        self.spool_threshold = bytes;
        self
    }

    /// Directory for spool files instead of the system temp directory.
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    pub fn events(&self) -> &StatusEventBus {
        &self.events
    }

    pub fn is_busy(&self) -> bool {
        lock_slot(&self.active).is_some()
    }

    /// Run one worker to completion.
    ///
    /// Resolves exactly once: when the process exits, or immediately on
    /// `Busy`, spool or spawn failure.
    pub async fn invoke(&self, invocation: WorkerInvocation) -> WorkerResult<serde_json::Value> {
        let (id, cancel_rx) = self.reserve()?;
        let _slot = SlotGuard {
            active: &self.active,
            id,
        };

        // Dropping this deletes any spool file, so it must outlive the process
        let payload = invocation
            .payload
            .as_ref()
            .map(|payload| {
                prepare_payload(payload, self.spool_threshold, self.spool_dir.as_deref())
            })
            .transpose()
            .map_err(WorkerError::Spool)?;

        let mut args = self.command.base_args.clone();
        args.extend(invocation.to_args());
        if let Some(payload) = &payload {
            args.extend(payload.args().iter().cloned());
        }

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        info!(
            "Starting worker {} (action: {}, spooled: {})",
            self.command.program,
            invocation.action,
            payload.as_ref().and_then(|p| p.spool_path()).is_some()
        );

        let mut child = cmd.spawn().map_err(|source| {
            warn!("Failed to start worker {}: {}", self.command.program, source);
            WorkerError::Spawn {
                program: self.command.program.clone(),
                source,
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, capture, stderr_text) = tokio::join!(
            wait_for_exit(&mut child, cancel_rx),
            read_stdout(stdout, &self.events),
            read_stderr(stderr),
        );
        let status = status?;

        drop(payload);

        info!(
            "Worker {} exited with {:?}",
            invocation.action,
            status.code()
        );

        resolve(status, invocation.result_mode, capture, stderr_text)
    }

    /// Ask the running worker to terminate and release it.
    ///
    /// Returns `false` when no worker is active. The pending `invoke` still
    /// resolves once the process actually exits.
    pub fn cancel(&self) -> bool {
        let taken = lock_slot(&self.active).take();
        match taken {
            Some(worker) => {
                info!("Cancelling worker {}", self.command.program);
                // The invocation may have just finished; nothing left to signal then
                let _ = worker.cancel_tx.send(());
                true
            }
            None => false,
        }
    }

    fn reserve(&self) -> WorkerResult<(Uuid, oneshot::Receiver<()>)> {
        let mut active = lock_slot(&self.active);
        if active.is_some() {
            debug!("Rejecting invocation, worker {} busy", self.command.program);
            return Err(WorkerError::Busy);
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let id = Uuid::new_v4();
        *active = Some(ActiveWorker { id, cancel_tx });
        Ok((id, cancel_rx))
    }
}

async fn wait_for_exit(
    child: &mut Child,
    mut cancel_rx: oneshot::Receiver<()>,
) -> std::io::Result<ExitStatus> {
    let cancelled = tokio::select! {
        status = child.wait() => return status,
        signal = &mut cancel_rx => signal.is_ok(),
    };

    if cancelled {
        request_termination(child);
    }
    child.wait().await
}

fn request_termination(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is our own child and has not been reaped yet, since
        // `id()` returns None after `wait` completes.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            return;
        }
    }

    if let Err(e) = child.start_kill() {
        warn!("Failed to terminate worker: {}", e);
    }
}

async fn read_stdout(stdout: Option<ChildStdout>, events: &StatusEventBus) -> StdoutCapture {
    let mut capture = StdoutCapture::default();
    let Some(stdout) = stdout else {
        return capture;
    };

    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                capture.raw.push_str(&text);
                if !events.publish_line(&text) {
                    capture.result.push_str(&text);
                }
            }
            Err(e) => {
                warn!("Stopped reading worker stdout: {}", e);
                break;
            }
        }
    }
    capture
}

async fn read_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };

    let mut bytes = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut bytes).await {
        warn!("Stopped reading worker stderr: {}", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn resolve(
    status: ExitStatus,
    mode: ResultMode,
    capture: StdoutCapture,
    stderr: String,
) -> WorkerResult<serde_json::Value> {
    let stderr = stderr.trim();

    if !status.success() {
        let message = if !stderr.is_empty() {
            stderr.to_string()
        } else {
            match status.code() {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            }
        };
        return Err(WorkerError::Failed {
            message,
            code: status.code(),
        });
    }

    match mode {
        ResultMode::Json => serde_json::from_str(capture.result.trim()).map_err(|_| {
            WorkerError::ResultMalformed {
                stderr: (!stderr.is_empty()).then(|| stderr.to_string()),
            }
        }),
        ResultMode::ExitStatus => Ok(serde_json::json!({
            "success": true,
            "output": capture.raw,
        })),
    }
}
