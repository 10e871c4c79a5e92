//! Ordered step pipeline with short-circuit error propagation.
//!
//! A pipeline performs no I/O and no retries of its own; side effects live
//! inside steps and retry policy belongs to the caller.

use std::time::Instant;

use async_trait::async_trait;
use tracing::Instrument;

use crate::{
    context::{RequestContext, StepReport},
    error::ApiError,
};

/// A named unit of work over a request context.
#[async_trait]
pub trait Step<I, R, X = ()>: Send + Sync {
    /// Step name, used in logs and reports.
    fn name(&self) -> &'static str;

    /// Run the step.
    ///
    /// # Errors
    /// Returning an error stops the pipeline; later steps do not run.
    async fn execute(&self, ctx: &mut RequestContext<I, R, X>) -> Result<(), ApiError>;
}

/// Steps executed in registration order.
pub struct Pipeline<I, R, X = ()> {
    name: String,
    steps: Vec<Box<dyn Step<I, R, X>>>,
}

/// Fluent builder for [`Pipeline`].
pub struct PipelineBuilder<I, R, X = ()> {
    pipeline: Pipeline<I, R, X>,
}

impl<I, R, X> PipelineBuilder<I, R, X> {
    /// Append a step.
    #[must_use]
    pub fn add_step(mut self, step: impl Step<I, R, X> + 'static) -> Self {
        self.pipeline.steps.push(Box::new(step));
        self
    }

    /// Append a step when `condition` holds.
    #[must_use]
    pub fn add_step_if(self, condition: bool, step: impl Step<I, R, X> + 'static) -> Self {
        if condition { self.add_step(step) } else { self }
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Pipeline<I, R, X> {
        self.pipeline
    }
}

impl<I, R, X> Pipeline<I, R, X> {
    /// Start building a pipeline.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<I, R, X> {
        PipelineBuilder {
            pipeline: Self {
                name: name.into(),
                steps: Vec::new(),
            },
        }
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of registered steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Names of the registered steps, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl<I, R, X> Pipeline<I, R, X>
where
    I: Send + Sync,
    R: Send,
    X: Send,
{
    /// Run every step in order against `ctx`.
    ///
    /// # Errors
    /// Returns the first step error exactly as the step produced it.
    pub async fn execute(&self, ctx: &mut RequestContext<I, R, X>) -> Result<(), ApiError> {
        let total = self.steps.len();
        tracing::debug!(pipeline = %self.name, steps = total, "Starting pipeline");

        for (index, step) in self.steps.iter().enumerate() {
            let step_name = step.name();
            tracing::debug!(
                pipeline = %self.name,
                step = step_name,
                "Executing step {}/{}",
                index + 1,
                total
            );

            let started = Instant::now();
            let span = tracing::debug_span!("step", pipeline = %self.name, step = step_name);
            let outcome = step.execute(ctx).instrument(span).await;
            let elapsed = started.elapsed();

            if let Err(err) = outcome {
                tracing::debug!(
                    pipeline = %self.name,
                    step = step_name,
                    ?elapsed,
                    error = %err,
                    "Step failed"
                );
                return Err(err);
            }

            tracing::debug!(pipeline = %self.name, step = step_name, ?elapsed, "Step completed");
            ctx.record(StepReport {
                step: step_name,
                elapsed,
            });
        }

        tracing::debug!(pipeline = %self.name, "Pipeline completed");
        Ok(())
    }
}
