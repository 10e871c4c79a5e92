//! Core abstractions for agent execution streaming.
//!
//! This crate provides the fundamental building blocks:
//! - `Execution` - The execution resource and its partial-update merge
//! - `Pipeline` / `Step` - Ordered request processing over a `RequestContext`
//! - `StreamBroker` - Non-blocking fan-out of updates to subscribers
//! - `ApiError` - Error taxonomy surfaced to callers
//! - Persistence, relay and workflow collaborator traits

pub mod broker;
pub mod context;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod traits;

pub use broker::{
    BroadcastOutcome, SUBSCRIBER_QUEUE_CAPACITY, StreamBroker, Streamable, Subscription,
    SubscriptionGuard,
};
pub use context::{RequestContext, Scratch, ScratchKey, StepReport};
pub use error::{ApiError, ErrorCode};
pub use execution::{
    AgentMessage, Execution, ExecutionId, ExecutionPhase, ExecutionSpec, ExecutionStatus,
    MessageKind, ResourceMetadata, SubExecution, TodoItem, TodoStatus, ToolCall, ToolCallStatus,
};
pub use pipeline::{Pipeline, PipelineBuilder, Step};
pub use traits::{
    ExecutionSink, RelayError, ResourceKind, ResourceStore, StoreError, WorkflowStartError,
    WorkflowStarter,
};

/// Resource kind name used in `NotFound` errors for executions.
pub const EXECUTION_KIND: &str = "AgentExecution";
