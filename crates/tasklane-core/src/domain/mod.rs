//! Domain model (ids, modes, outcomes, tasks, status views, errors).

pub mod errors;
pub mod ids;
pub mod mode;
pub mod outcome;
pub mod status;
pub mod task;

pub use self::errors::SchedulerError;
pub use self::ids::SequenceId;
pub use self::mode::{AdmissionMode, Placement};
pub use self::outcome::{Outcome, StatusNotification, TaskError};
pub use self::status::{Counts, StatusSnapshot};
pub use self::task::{Batch, Task, TaskFn};
