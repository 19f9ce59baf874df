//! tasklane-core
//!
//! An in-process task scheduler with two admission modes.
//!
//! # Modules
//! - **domain**: ids, modes, outcomes, tasks, status views, errors
//! - **queue**: per-task records and the four-collection store
//! - **engine**: admission rule, execution wrapper, completion tracking
//! - **config** / **hooks** / **builder**: how a scheduler is put together
//! - **scheduler**: the public handle
//!
//! Tasks added as `Concurrent` may run together; a `Barrier` task waits for
//! everything admitted before it and blocks everything queued after it.

pub mod builder;
pub mod config;
pub mod domain;
pub mod engine;
pub mod hooks;
pub mod queue;
pub mod scheduler;

pub use builder::SchedulerBuilder;
pub use config::SchedulerConfig;
pub use domain::{
    AdmissionMode, Batch, Counts, Outcome, Placement, SchedulerError, SequenceId,
    StatusNotification, StatusSnapshot, Task, TaskError,
};
pub use engine::{Resolver, TaskContext};
pub use queue::{Collection, CollectionsView, TaskDescriptor, TaskKey, TaskState};
pub use scheduler::{Cancellation, Scheduler};
