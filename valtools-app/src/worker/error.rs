use thiserror::Error;

/// Failures resolved by a worker invocation.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Another worker is still running under this supervisor.
    #[error("A worker is already running")]
    Busy,

    /// The worker executable could not be started.
    #[error("Failed to start worker {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The payload file could not be written.
    #[error("Failed to spool worker payload: {0}")]
    Spool(#[source] std::io::Error),

    /// The worker exited unsuccessfully. `message` is its error-stream text,
    /// or `exit code <n>` when it wrote nothing there.
    #[error("{message}")]
    Failed { message: String, code: Option<i32> },

    /// The worker exited cleanly but its output was not one JSON document.
    #[error("Worker returned an unreadable result{}", stderr_suffix(.stderr))]
    ResultMalformed { stderr: Option<String> },

    /// Waiting on the worker process failed.
    #[error("Worker I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(text) => format!(": {}", text),
        None => String::new(),
    }
}

pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

impl WorkerError {
    /// Stable error code for programmatic handling by a front end.
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::Busy => "WORKER_BUSY",
            WorkerError::Spawn { .. } => "WORKER_SPAWN_ERROR",
            WorkerError::Spool(_) => "WORKER_SPOOL_ERROR",
            WorkerError::Failed { .. } => "WORKER_FAILED",
            WorkerError::ResultMalformed { .. } => "RESULT_MALFORMED",
            WorkerError::Io(_) => "IO_ERROR",
        }
    }
}

impl serde::Serialize for WorkerError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("WorkerError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
