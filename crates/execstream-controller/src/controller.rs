//! Execution controller: one pipeline per procedure.

use std::sync::Arc;

use execstream_core::{
    ApiError, Execution, ExecutionSink, ExecutionStatus, Pipeline, RequestContext, ResourceStore,
    StreamBroker, WorkflowStarter,
};
use tokio_util::sync::CancellationToken;

use crate::{
    create, delete, get, list_by_session,
    subscribe::{self, StreamEnd, SubscribeOutcome, SubscribeState},
    update_status::{self, UpdateStatusInput},
};

/// Serves the execution procedures.
///
/// Pipelines are built once; every call gets its own `RequestContext`
/// that is dropped when the call returns.
pub struct ExecutionController {
    broker: Arc<StreamBroker<Execution>>,
    create: Pipeline<Execution, Execution>,
    get: Pipeline<String, Execution>,
    delete: Pipeline<String, Execution>,
    list_by_session: Pipeline<String, Vec<Execution>>,
    update_status: Pipeline<UpdateStatusInput, Execution>,
    subscribe: Pipeline<String, Execution, SubscribeState>,
}

impl ExecutionController {
    /// Create a controller.
    ///
    /// Without a workflow starter, created executions stay pending.
    #[must_use]
    pub fn new(
        store: Arc<dyn ResourceStore>,
        broker: Arc<StreamBroker<Execution>>,
        workflow_starter: Option<Arc<dyn WorkflowStarter>>,
    ) -> Self {
        Self {
            create: create::pipeline(&store, &broker, workflow_starter),
            get: get::pipeline(&store),
            delete: delete::pipeline(&store),
            list_by_session: list_by_session::pipeline(&store),
            update_status: update_status::pipeline(&store, &broker),
            subscribe: subscribe::pipeline(&store, &broker),
            broker,
        }
    }

    /// The broker updates are published on.
    #[must_use]
    pub const fn broker(&self) -> &Arc<StreamBroker<Execution>> {
        &self.broker
    }

    /// Create an execution and start its workflow.
    ///
    /// # Errors
    /// `InvalidArgument` for a missing name or missing session and agent,
    /// `Internal` when persisting or starting the workflow fails.
    pub async fn create(&self, execution: Execution) -> Result<Execution, ApiError> {
        let mut ctx = RequestContext::new(execution.clone(), CancellationToken::new());
        ctx.set_result(execution);
        run(&self.create, ctx).await
    }

    /// Fetch an execution.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty id, `NotFound` if absent.
    pub async fn get(&self, execution_id: &str) -> Result<Execution, ApiError> {
        let ctx = RequestContext::new(execution_id.to_string(), CancellationToken::new());
        run(&self.get, ctx).await
    }

    /// Delete an execution, returning it.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty id, `NotFound` if absent.
    pub async fn delete(&self, execution_id: &str) -> Result<Execution, ApiError> {
        let ctx = RequestContext::new(execution_id.to_string(), CancellationToken::new());
        run(&self.delete, ctx).await
    }

    /// Executions of a session, newest first.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty session id.
    pub async fn list_by_session(&self, session_id: &str) -> Result<Vec<Execution>, ApiError> {
        let ctx = RequestContext::new(session_id.to_string(), CancellationToken::new());
        run(&self.list_by_session, ctx).await
    }

    /// Merge a partial status into an execution, persist and publish it.
    ///
    /// # Errors
    /// `InvalidArgument` for a missing id or status, `NotFound` for an
    /// unknown id, `Internal` if persisting fails.
    pub async fn update_status(
        &self,
        execution_id: &str,
        status: Option<ExecutionStatus>,
    ) -> Result<Execution, ApiError> {
        let input = UpdateStatusInput {
            execution_id: execution_id.to_string(),
            status,
        };
        let ctx = RequestContext::new(input, CancellationToken::new());
        run(&self.update_status, ctx).await
    }

    /// Relay the current state of an execution to `sink`, then live updates.
    ///
    /// Returns once a terminal snapshot was relayed or `cancel` fires, even
    /// while `sink` is blocked on a send.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty id, `NotFound` for an unknown id,
    /// `Internal` if the sink rejects a snapshot.
    pub async fn subscribe(
        &self,
        execution_id: &str,
        sink: impl ExecutionSink + 'static,
        cancel: CancellationToken,
    ) -> Result<SubscribeOutcome, ApiError> {
        let mut ctx = RequestContext::with_ext(
            execution_id.to_string(),
            SubscribeState::new(sink),
            cancel,
        );
        self.subscribe.execute(&mut ctx).await?;

        let (_, state) = ctx.into_parts();
        Ok(SubscribeOutcome {
            relayed: state.relayed(),
            end: state.ended().unwrap_or(StreamEnd::Cancelled),
        })
    }

    /// Live subscribers of an execution.
    #[must_use]
    pub fn subscriber_count(&self, execution_id: &str) -> usize {
        self.broker.subscriber_count(execution_id)
    }
}

async fn run<I, R>(
    pipeline: &Pipeline<I, R>,
    mut ctx: RequestContext<I, R>,
) -> Result<R, ApiError>
where
    I: Send + Sync,
    R: Send,
{
    pipeline.execute(&mut ctx).await?;
    ctx.take_result()
        .ok_or_else(|| ApiError::internal("pipeline produced no result", pipeline.name()))
}
