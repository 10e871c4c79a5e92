//! Steps shared by several execution pipelines.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use execstream_core::{
    ApiError, EXECUTION_KIND, Execution, RequestContext, ResourceKind, ResourceStore, Step,
    StreamBroker,
};
use execstream_store::codec;

/// An input that addresses one execution.
pub trait ExecutionAddress: Send + Sync {
    fn execution_id(&self) -> &str;
}

impl ExecutionAddress for String {
    fn execution_id(&self) -> &str {
        self
    }
}

pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// The execution in the result slot, or an internal error naming the step.
pub(crate) fn current<'a, I, X>(
    ctx: &'a mut RequestContext<I, Execution, X>,
    step: &'static str,
) -> Result<&'a mut Execution, ApiError> {
    ctx.result_mut()
        .ok_or_else(|| ApiError::internal("execution not found in context", step))
}

/// Rejects an empty execution id.
pub struct ValidateExecutionId;

#[async_trait]
impl<I, R, X> Step<I, R, X> for ValidateExecutionId
where
    I: ExecutionAddress,
    R: Send,
    X: Send,
{
    fn name(&self) -> &'static str {
        "ValidateExecutionId"
    }

    async fn execute(&self, ctx: &mut RequestContext<I, R, X>) -> Result<(), ApiError> {
        if ctx.input().execution_id().is_empty() {
            return Err(ApiError::invalid_argument("execution_id is required"));
        }
        Ok(())
    }
}

/// Loads the addressed execution into the result slot.
pub struct LoadExecution {
    store: Arc<dyn ResourceStore>,
}

impl LoadExecution {
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<I, X> Step<I, Execution, X> for LoadExecution
where
    I: ExecutionAddress,
    X: Send,
{
    fn name(&self) -> &'static str {
        "LoadExecution"
    }

    async fn execute(&self, ctx: &mut RequestContext<I, Execution, X>) -> Result<(), ApiError> {
        let id = ctx.input().execution_id();
        let execution =
            load_execution(self.store.as_ref(), id, "failed to load execution").await?;
        ctx.set_result(execution);
        Ok(())
    }
}

/// Load an execution, mapping absence to `NotFound`.
pub(crate) async fn load_execution(
    store: &dyn ResourceStore,
    id: &str,
    failure: &'static str,
) -> Result<Execution, ApiError> {
    codec::load::<Execution>(store, ResourceKind::AgentExecution, id)
        .await
        .map_err(|e| {
            tracing::error!(execution_id = id, error = %e, "Failed to load execution");
            ApiError::internal(failure, e)
        })?
        .ok_or_else(|| ApiError::not_found(EXECUTION_KIND, id))
}

/// Writes the execution in the result slot.
pub struct PersistExecution {
    store: Arc<dyn ResourceStore>,
    failure: &'static str,
}

impl PersistExecution {
    /// `failure` is the message of the `Internal` error returned when the write fails.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, failure: &'static str) -> Self {
        Self { store, failure }
    }
}

#[async_trait]
impl<I, X> Step<I, Execution, X> for PersistExecution
where
    I: Send + Sync,
    X: Send,
{
    fn name(&self) -> &'static str {
        "PersistExecution"
    }

    async fn execute(&self, ctx: &mut RequestContext<I, Execution, X>) -> Result<(), ApiError> {
        let execution = current(ctx, "PersistExecution")?;
        save_execution(self.store.as_ref(), execution, self.failure).await?;
        tracing::info!(
            execution_id = execution.id(),
            phase = execution.phase().as_str(),
            "Persisted execution"
        );
        Ok(())
    }
}

pub(crate) async fn save_execution(
    store: &dyn ResourceStore,
    execution: &Execution,
    failure: &'static str,
) -> Result<(), ApiError> {
    codec::save(store, ResourceKind::AgentExecution, execution.id(), execution)
        .await
        .map_err(|e| {
            tracing::error!(
                execution_id = execution.id(),
                error = %e,
                "Failed to persist execution"
            );
            ApiError::internal(failure, e)
        })
}

/// Hands the execution in the result slot to live subscribers.
pub struct BroadcastExecution {
    broker: Arc<StreamBroker<Execution>>,
}

impl BroadcastExecution {
    #[must_use]
    pub fn new(broker: Arc<StreamBroker<Execution>>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl<I, X> Step<I, Execution, X> for BroadcastExecution
where
    I: Send + Sync,
    X: Send,
{
    fn name(&self) -> &'static str {
        "BroadcastExecution"
    }

    async fn execute(&self, ctx: &mut RequestContext<I, Execution, X>) -> Result<(), ApiError> {
        let execution = current(ctx, "BroadcastExecution")?;
        let outcome = self.broker.broadcast(execution);
        tracing::debug!(
            execution_id = execution.id(),
            phase = execution.phase().as_str(),
            subscribers = outcome.delivered,
            dropped = outcome.dropped,
            "Broadcast execution update"
        );
        Ok(())
    }
}
