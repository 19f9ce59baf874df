//! Queue module: record state, records and the four-collection store.

mod record;
mod state;
mod store;

pub use record::TaskRecord;
pub use state::TaskState;
pub use store::{Collection, CollectionsView, QueueStore, TaskDescriptor, TaskKey};
