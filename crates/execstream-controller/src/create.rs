//! Create pipeline.
//!
//! Validate, resolve the slug, build the new state, mark it pending, persist
//! and start the workflow. A workflow start failure leaves the execution in
//! the failed phase, persisted and broadcast, before the error is returned.

use std::sync::Arc;

use async_trait::async_trait;
use execstream_core::{
    ApiError, Execution, ExecutionPhase, ExecutionStatus, Pipeline, RequestContext, ResourceStore,
    Step, StreamBroker, WorkflowStarter,
};
use uuid::Uuid;

use crate::{
    slug::slugify,
    steps::{PersistExecution, current, now, save_execution},
};

/// Prefix of generated execution ids.
pub const EXECUTION_ID_PREFIX: &str = "aex";

pub(crate) fn pipeline(
    store: &Arc<dyn ResourceStore>,
    broker: &Arc<StreamBroker<Execution>>,
    workflow_starter: Option<Arc<dyn WorkflowStarter>>,
) -> Pipeline<Execution, Execution> {
    Pipeline::builder("agent-execution-create")
        .add_step(ValidateCreateInput)
        .add_step(ResolveSlug)
        .add_step(BuildNewState)
        .add_step(SetInitialPhase)
        .add_step(PersistExecution::new(
            Arc::clone(store),
            "failed to create execution",
        ))
        .add_step(StartWorkflow {
            starter: workflow_starter,
            store: Arc::clone(store),
            broker: Arc::clone(broker),
        })
        .build()
}

struct ValidateCreateInput;

#[async_trait]
impl Step<Execution, Execution> for ValidateCreateInput {
    fn name(&self) -> &'static str {
        "ValidateCreateInput"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<Execution, Execution>,
    ) -> Result<(), ApiError> {
        let input = ctx.input();
        if input.metadata.name.trim().is_empty() {
            return Err(ApiError::invalid_argument("metadata.name is required"));
        }
        if input.spec.session_id.is_empty() && input.spec.agent_id.is_empty() {
            tracing::warn!("Neither session_id nor agent_id provided");
            return Err(ApiError::invalid_argument(
                "either session_id or agent_id must be provided",
            ));
        }
        Ok(())
    }
}

struct ResolveSlug;

#[async_trait]
impl Step<Execution, Execution> for ResolveSlug {
    fn name(&self) -> &'static str {
        "ResolveSlug"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<Execution, Execution>,
    ) -> Result<(), ApiError> {
        let execution = current(ctx, "ResolveSlug")?;
        if execution.metadata.slug.is_empty() {
            execution.metadata.slug = slugify(&execution.metadata.name);
        }
        Ok(())
    }
}

struct BuildNewState;

#[async_trait]
impl Step<Execution, Execution> for BuildNewState {
    fn name(&self) -> &'static str {
        "BuildNewState"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<Execution, Execution>,
    ) -> Result<(), ApiError> {
        let execution = current(ctx, "BuildNewState")?;
        let timestamp = now();
        execution.metadata.id = format!("{EXECUTION_ID_PREFIX}-{}", Uuid::new_v4());
        execution.metadata.created_at = timestamp;
        execution.metadata.updated_at = timestamp;
        execution.status = ExecutionStatus::default();
        Ok(())
    }
}

struct SetInitialPhase;

#[async_trait]
impl Step<Execution, Execution> for SetInitialPhase {
    fn name(&self) -> &'static str {
        "SetInitialPhase"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<Execution, Execution>,
    ) -> Result<(), ApiError> {
        current(ctx, "SetInitialPhase")?.status.phase = ExecutionPhase::Pending;
        Ok(())
    }
}

struct StartWorkflow {
    starter: Option<Arc<dyn WorkflowStarter>>,
    store: Arc<dyn ResourceStore>,
    broker: Arc<StreamBroker<Execution>>,
}

#[async_trait]
impl Step<Execution, Execution> for StartWorkflow {
    fn name(&self) -> &'static str {
        "StartWorkflow"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<Execution, Execution>,
    ) -> Result<(), ApiError> {
        let execution = current(ctx, "StartWorkflow")?;

        let Some(starter) = &self.starter else {
            tracing::warn!(
                execution_id = execution.id(),
                "No workflow starter configured, execution stays pending"
            );
            return Ok(());
        };

        let Err(cause) = starter.start(execution).await else {
            tracing::info!(execution_id = execution.id(), "Workflow started");
            return Ok(());
        };

        tracing::error!(
            execution_id = execution.id(),
            error = %cause,
            "Failed to start workflow, marking execution as failed"
        );
        execution.status.phase = ExecutionPhase::Failed;
        execution.status.error = Some(format!("failed to start workflow: {cause}"));
        execution.metadata.updated_at = now();

        save_execution(
            self.store.as_ref(),
            execution,
            "failed to start workflow and failed to update status",
        )
        .await?;
        self.broker.broadcast(execution);

        Err(ApiError::internal("failed to start workflow", cause))
    }
}
