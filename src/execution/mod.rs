//! Execution state: identities, records, the main-thread registry and the
//! coordinator that connects it to running processes.

mod coordinator;
mod dispatch;
mod record;
mod registry;

pub use coordinator::{ExecutionCoordinator, STOPPED_BY_USER_NOTE};
pub use dispatch::{MainQueue, MainTask, MainThreadHandle, TickTimer};
pub use record::{
    format_elapsed, ExecutionId, ExecutionRecord, ExecutionStatus, ScriptDescriptor,
};
pub use registry::{
    ExecutionRegistry, Observer, RegistryChange, SubscriptionId, UpsertOutcome,
};
