//! Subscribe pipeline.
//!
//! Replays the current state of an execution, then relays live updates from
//! the broker until a terminal phase, cancellation or an unexpected queue
//! close. The broker queue is released on every exit path.
//!
//! ```text
//! Validating -> LoadingInitial -> Streaming -> Terminated
//!                     |                            ^
//!                     +---- initial is terminal ---+
//! ```

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use execstream_core::{
    ApiError, Execution, ExecutionPhase, ExecutionSink, Pipeline, RequestContext, ResourceStore,
    Step, StreamBroker,
};

use crate::steps::{ValidateExecutionId, load_execution};

/// Phase and message count of the snapshot replayed on subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub phase: ExecutionPhase,
    pub message_count: usize,
}

/// Why a subscription ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A terminal snapshot was relayed.
    Terminal(ExecutionPhase),
    /// The caller cancelled.
    Cancelled,
    /// The broker queue closed underneath the loop.
    QueueClosed,
}

/// Per-call state of the subscribe pipeline.
pub struct SubscribeState {
    sink: Box<dyn ExecutionSink>,
    baseline: Option<Baseline>,
    relayed: usize,
    ended: Option<StreamEnd>,
}

impl SubscribeState {
    pub fn new(sink: impl ExecutionSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            baseline: None,
            relayed: 0,
            ended: None,
        }
    }

    #[must_use]
    pub const fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    /// Snapshots relayed so far, the initial one included.
    #[must_use]
    pub const fn relayed(&self) -> usize {
        self.relayed
    }

    #[must_use]
    pub const fn ended(&self) -> Option<StreamEnd> {
        self.ended
    }
}

impl fmt::Debug for SubscribeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeState")
            .field("baseline", &self.baseline)
            .field("relayed", &self.relayed)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

/// Summary of a completed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOutcome {
    pub relayed: usize,
    pub end: StreamEnd,
}

pub(crate) type SubscribeContext = RequestContext<String, Execution, SubscribeState>;

pub(crate) fn pipeline(
    store: &Arc<dyn ResourceStore>,
    broker: &Arc<StreamBroker<Execution>>,
) -> Pipeline<String, Execution, SubscribeState> {
    Pipeline::builder("agent-execution-subscribe")
        .add_step(ValidateExecutionId)
        .add_step(LoadInitialExecution {
            store: Arc::clone(store),
        })
        .add_step(StreamUpdates {
            broker: Arc::clone(broker),
        })
        .build()
}

struct LoadInitialExecution {
    store: Arc<dyn ResourceStore>,
}

#[async_trait]
impl Step<String, Execution, SubscribeState> for LoadInitialExecution {
    fn name(&self) -> &'static str {
        "LoadInitialExecution"
    }

    async fn execute(&self, ctx: &mut SubscribeContext) -> Result<(), ApiError> {
        let execution =
            load_execution(self.store.as_ref(), ctx.input(), "failed to load execution").await?;
        let phase = execution.phase();
        let baseline = Baseline {
            phase,
            message_count: execution.status.messages.len(),
        };

        let relayed = relay(ctx, execution, "failed to send execution state").await?;

        let state = ctx.ext_mut();
        state.baseline = Some(baseline);
        if relayed == Relayed::Cancelled {
            state.ended = Some(StreamEnd::Cancelled);
            tracing::debug!(
                execution_id = %ctx.input(),
                "Cancelled before initial state was sent"
            );
            return Ok(());
        }
        if phase.is_terminal() {
            state.ended = Some(StreamEnd::Terminal(phase));
        }

        tracing::debug!(
            execution_id = %ctx.input(),
            phase = phase.as_str(),
            "Sent initial execution state"
        );
        Ok(())
    }
}

struct StreamUpdates {
    broker: Arc<StreamBroker<Execution>>,
}

#[async_trait]
impl Step<String, Execution, SubscribeState> for StreamUpdates {
    fn name(&self) -> &'static str {
        "StreamUpdates"
    }

    async fn execute(&self, ctx: &mut SubscribeContext) -> Result<(), ApiError> {
        match ctx.ext().ended {
            Some(StreamEnd::Terminal(phase)) => {
                tracing::info!(
                    execution_id = %ctx.input(),
                    phase = phase.as_str(),
                    "Execution already terminal, not streaming"
                );
                return Ok(());
            }
            Some(_) => return Ok(()),
            None => {}
        }

        let execution_id = ctx.input().clone();
        let cancel = ctx.cancellation_token().clone();
        let mut subscription = self.broker.subscribe_guarded(&execution_id);

        tracing::info!(
            execution_id = %execution_id,
            subscribers = self.broker.subscriber_count(&execution_id),
            "Subscription started"
        );

        let end = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break StreamEnd::Cancelled,
                next = subscription.recv() => {
                    // Only reachable if the broker drops its sender while the
                    // guard still holds the subscription.
                    let Some(execution) = next else {
                        tracing::warn!(
                            execution_id = %execution_id,
                            "Subscriber queue closed unexpectedly"
                        );
                        break StreamEnd::QueueClosed;
                    };
                    let phase = execution.phase();
                    log_progress(ctx, &execution);

                    let failure = "failed to send execution updates";
                    if relay(ctx, execution, failure).await? == Relayed::Cancelled {
                        break StreamEnd::Cancelled;
                    }
                    if phase.is_terminal() {
                        break StreamEnd::Terminal(phase);
                    }
                }
            }
        };

        ctx.ext_mut().ended = Some(end);
        tracing::info!(
            execution_id = %execution_id,
            end = ?end,
            relayed = ctx.ext().relayed,
            "Subscription ended"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relayed {
    Sent,
    Cancelled,
}

/// Send one snapshot to the caller and remember it as the latest relayed.
///
/// A stalled sink never outlives cancellation: the send is abandoned as soon
/// as the token fires, and a send that fails after cancellation counts as
/// cancelled.
async fn relay(
    ctx: &mut SubscribeContext,
    execution: Execution,
    failure: &'static str,
) -> Result<Relayed, ApiError> {
    let cancel = ctx.cancellation_token().clone();
    let sent = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(Relayed::Cancelled),
        sent = ctx.ext_mut().sink.send(execution.clone()) => sent,
    };

    if let Err(e) = sent {
        if cancel.is_cancelled() {
            return Ok(Relayed::Cancelled);
        }
        tracing::error!(execution_id = execution.id(), error = %e, "Failed to relay execution");
        return Err(ApiError::internal(failure, e));
    }
    ctx.ext_mut().relayed += 1;
    ctx.set_result(execution);
    Ok(Relayed::Sent)
}

fn log_progress(ctx: &SubscribeContext, execution: &Execution) {
    let Some(baseline) = ctx.ext().baseline else {
        return;
    };
    tracing::debug!(
        execution_id = execution.id(),
        phase = execution.phase().as_str(),
        phase_changed = execution.phase() != baseline.phase,
        new_messages = execution
            .status
            .messages
            .len()
            .saturating_sub(baseline.message_count),
        "Relaying execution update"
    );
}
