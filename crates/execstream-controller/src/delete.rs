//! Delete pipeline. Returns the entity as it was before deletion.

use std::sync::Arc;

use async_trait::async_trait;
use execstream_core::{
    ApiError, Execution, Pipeline, RequestContext, ResourceKind, ResourceStore, Step,
};

use crate::steps::{LoadExecution, ValidateExecutionId};

pub(crate) fn pipeline(store: &Arc<dyn ResourceStore>) -> Pipeline<String, Execution> {
    Pipeline::builder("agent-execution-delete")
        .add_step(ValidateExecutionId)
        .add_step(LoadExecution::new(Arc::clone(store)))
        .add_step(DeleteExecution {
            store: Arc::clone(store),
        })
        .build()
}

struct DeleteExecution {
    store: Arc<dyn ResourceStore>,
}

#[async_trait]
impl Step<String, Execution> for DeleteExecution {
    fn name(&self) -> &'static str {
        "DeleteExecution"
    }

    async fn execute(&self, ctx: &mut RequestContext<String, Execution>) -> Result<(), ApiError> {
        let id = ctx.input();
        self.store
            .delete(ResourceKind::AgentExecution, id)
            .await
            .map_err(|e| {
                tracing::error!(execution_id = %id, error = %e, "Failed to delete execution");
                ApiError::internal("failed to delete execution", e)
            })?;
        tracing::info!(execution_id = %id, "Deleted execution");
        Ok(())
    }
}
