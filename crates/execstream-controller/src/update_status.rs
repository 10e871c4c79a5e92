//! Status-update pipeline.
//!
//! Validate, load, merge the partial status, persist, broadcast. The
//! broadcast is the only coupling to the stream broker.

use std::sync::Arc;

use async_trait::async_trait;
use execstream_core::{
    ApiError, Execution, ExecutionStatus, Pipeline, RequestContext, ResourceStore, Step,
    StreamBroker,
};
use serde::{Deserialize, Serialize};

use crate::steps::{
    BroadcastExecution, ExecutionAddress, LoadExecution, PersistExecution, current, now,
};

/// A partial status for one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatusInput {
    pub execution_id: String,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

impl UpdateStatusInput {
    #[must_use]
    pub fn new(execution_id: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: Some(status),
        }
    }
}

impl ExecutionAddress for UpdateStatusInput {
    fn execution_id(&self) -> &str {
        &self.execution_id
    }
}

pub(crate) fn pipeline(
    store: &Arc<dyn ResourceStore>,
    broker: &Arc<StreamBroker<Execution>>,
) -> Pipeline<UpdateStatusInput, Execution> {
    Pipeline::builder("agent-execution-update-status")
        .add_step(ValidateUpdateStatusInput)
        .add_step(LoadExecution::new(Arc::clone(store)))
        .add_step(MergeStatus)
        .add_step(PersistExecution::new(
            Arc::clone(store),
            "failed to update execution status",
        ))
        .add_step(BroadcastExecution::new(Arc::clone(broker)))
        .build()
}

struct ValidateUpdateStatusInput;

#[async_trait]
impl Step<UpdateStatusInput, Execution> for ValidateUpdateStatusInput {
    fn name(&self) -> &'static str {
        "ValidateUpdateStatusInput"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<UpdateStatusInput, Execution>,
    ) -> Result<(), ApiError> {
        let input = ctx.input();
        if input.execution_id.is_empty() {
            return Err(ApiError::invalid_argument("execution_id is required"));
        }
        if input.status.is_none() {
            return Err(ApiError::invalid_argument("status is required"));
        }
        Ok(())
    }
}

struct MergeStatus;

#[async_trait]
impl Step<UpdateStatusInput, Execution> for MergeStatus {
    fn name(&self) -> &'static str {
        "MergeStatus"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<UpdateStatusInput, Execution>,
    ) -> Result<(), ApiError> {
        let Some(update) = ctx.input().status.clone() else {
            return Err(ApiError::invalid_argument("status is required"));
        };
        let execution = current(ctx, "MergeStatus")?;

        execution.status.merge_from(&update);
        execution.metadata.updated_at = now();

        tracing::debug!(
            execution_id = execution.id(),
            phase = execution.phase().as_str(),
            messages = execution.status.messages.len(),
            tool_calls = execution.status.tool_calls.len(),
            "Merged status fields"
        );
        Ok(())
    }
}
