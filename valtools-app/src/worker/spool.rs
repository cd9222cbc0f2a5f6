//! Temp-file spooling for payloads too large to pass on the command line.
//!
//! The file lives exactly as long as the returned guard. The supervisor
//! holds the guard until the worker has exited (or failed to spawn), so the
//! file is removed on every exit path.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::worker::invocation::WorkerPayload;

/// Payloads whose JSON text is longer than this are spooled by default.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 8 * 1024;

const SPOOL_PREFIX: &str = "valtools_payload_";

/// How a payload reaches the worker.
#[derive(Debug)]
pub enum PreparedPayload {
    Inline(Vec<String>),
    Spooled {
        args: Vec<String>,
        file: NamedTempFile,
    },
}

impl PreparedPayload {
    pub fn args(&self) -> &[String] {
        match self {
            PreparedPayload::Inline(args) => args,
            PreparedPayload::Spooled { args, .. } => args,
        }
    }

    pub fn spool_path(&self) -> Option<&Path> {
        match self {
            PreparedPayload::Inline(_) => None,
            PreparedPayload::Spooled { file, .. } => Some(file.path()),
        }
    }
}

/// Render `payload` as `--<flag> <json>`, or write it to a uniquely named
/// temp file and render `--<flag>-file <path>` when it exceeds `threshold`.
///
/// Spool files go to `dir`, or the system temp directory when `None`.
pub fn prepare_payload(
    payload: &WorkerPayload,
    threshold: usize,
    dir: Option<&Path>,
) -> std::io::Result<PreparedPayload> {
    let json = serde_json::to_string(&payload.value)?;

    if json.len() <= threshold {
        return Ok(PreparedPayload::Inline(vec![
            format!("--{}", payload.flag),
            json,
        ]));
    }

    // tempfile creates the file with 0600 permissions on Unix
    let mut builder = tempfile::Builder::new();
    builder.prefix(SPOOL_PREFIX).suffix(".json");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(json.as_bytes())?;
    file.flush()?;

    debug!(
        "Spooled {}-byte payload to {}",
        json.len(),
        file.path().display()
    );

    let args = vec![
        format!("--{}-file", payload.flag),
        file.path().to_string_lossy().into_owned(),
    ];
    Ok(PreparedPayload::Spooled { args, file })
}
