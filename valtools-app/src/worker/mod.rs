pub mod actions;
pub mod error;
pub mod events;
pub mod invocation;
pub mod spool;
pub mod supervisor;

pub use error::{WorkerError, WorkerResult};
pub use events::{next_status, parse_status_line, StatusEvent, StatusEventBus};
pub use invocation::{ResultMode, WorkerInvocation, WorkerPayload};
pub use spool::{prepare_payload, PreparedPayload, DEFAULT_SPOOL_THRESHOLD};
pub use supervisor::{WorkerCommand, WorkerSupervisor};
