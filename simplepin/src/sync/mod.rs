pub mod coordinator;
pub mod tasks;

pub use coordinator::{
    RefreshDecision, RefreshReason, SyncCoordinator, SyncError, SyncOutcome, decide_refresh,
};
pub use tasks::{TaskCategory, TaskController, TaskHandle, TaskOutcome};
