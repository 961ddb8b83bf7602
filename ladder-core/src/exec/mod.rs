//! Execution: priority op queue, cross-response directives, and the batch
//! executor that owns the live-order table.

pub mod cross_response;
pub mod executor;
pub mod queue;

pub use cross_response::{AdjustmentKind, CrossDirective, CrossResponder, LatencySummary};
pub use executor::{
    BatchExecutor, ExecFeedback, ExecView, ExecutorCtl, ExecutorHandle, ExecutorStats,
};
pub use queue::{OpPriority, OpQueue, OrderOp, QueueFull, QueuedOp};
