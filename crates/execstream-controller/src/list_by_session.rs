//! List-by-session pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use execstream_core::{
    ApiError, Execution, Pipeline, RequestContext, ResourceKind, ResourceStore, Step,
};
use execstream_store::codec;

pub(crate) fn pipeline(store: &Arc<dyn ResourceStore>) -> Pipeline<String, Vec<Execution>> {
    Pipeline::builder("agent-execution-list-by-session")
        .add_step(ValidateSessionId)
        .add_step(QueryBySession {
            store: Arc::clone(store),
        })
        .build()
}

struct ValidateSessionId;

#[async_trait]
impl Step<String, Vec<Execution>> for ValidateSessionId {
    fn name(&self) -> &'static str {
        "ValidateSessionId"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<String, Vec<Execution>>,
    ) -> Result<(), ApiError> {
        if ctx.input().is_empty() {
            return Err(ApiError::invalid_argument("session_id is required"));
        }
        Ok(())
    }
}

struct QueryBySession {
    store: Arc<dyn ResourceStore>,
}

#[async_trait]
impl Step<String, Vec<Execution>> for QueryBySession {
    fn name(&self) -> &'static str {
        "QueryBySession"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<String, Vec<Execution>>,
    ) -> Result<(), ApiError> {
        let session_id = ctx.input();
        let all: Vec<Execution> = codec::list(self.store.as_ref(), ResourceKind::AgentExecution)
            .await
            .map_err(|e| ApiError::internal("failed to list executions", e))?;

        let mut executions: Vec<Execution> = all
            .into_iter()
            .filter(|e| e.spec.session_id == *session_id)
            .collect();

        // Newest first; id breaks ties so the order is stable.
        executions.sort_by(|a, b| {
            b.metadata
                .created_at
                .cmp(&a.metadata.created_at)
                .then_with(|| a.metadata.id.cmp(&b.metadata.id))
        });

        tracing::debug!(session_id = %session_id, count = executions.len(), "Listed executions");
        ctx.set_result(executions);
        Ok(())
    }
}
