//! Collaborator traits: persistence, update relay and workflow start.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::execution::Execution;

/// Kind of persisted resource. Part of every storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    AgentExecution,
    Session,
}

impl ResourceKind {
    /// Stable key prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentExecution => "AgentExecution",
            Self::Session => "Session",
        }
    }

    /// Storage key of `id`: `kind/id`.
    #[must_use]
    pub fn key(self, id: &str) -> String {
        format!("{}/{id}", self.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Internal(String),
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Key-value persistence for serialized resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Load the bytes stored under `kind/id`.
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store bytes under `kind/id`, replacing any previous value.
    async fn save(&self, kind: ResourceKind, id: &str, data: Vec<u8>) -> Result<(), StoreError>;

    /// All values of `kind`, in no particular order.
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Remove `kind/id`. Removing an absent key is not an error.
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), StoreError>;
}

/// Failure to hand an update to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Subscriber disconnected")]
    Closed,
    #[error("Relay failed: {0}")]
    Transport(String),
}

/// Outbound half of a subscription.
#[async_trait]
pub trait ExecutionSink: Send {
    /// Deliver one snapshot.
    async fn send(&mut self, execution: Execution) -> Result<(), RelayError>;
}

#[async_trait]
impl ExecutionSink for mpsc::Sender<Execution> {
    async fn send(&mut self, execution: Execution) -> Result<(), RelayError> {
        Self::send(self, execution)
            .await
            .map_err(|_| RelayError::Closed)
    }
}

/// Workflow start error.
#[derive(Debug, Error)]
pub enum WorkflowStartError {
    #[error("Workflow engine unavailable: {0}")]
    Unavailable(String),
    #[error("Workflow rejected: {0}")]
    Rejected(String),
}

/// Kicks off the asynchronous work behind a new execution.
#[async_trait]
pub trait WorkflowStarter: Send + Sync {
    /// Start the workflow for a persisted execution.
    async fn start(&self, execution: &Execution) -> Result<(), WorkflowStartError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key() {
        assert_eq!(ResourceKind::AgentExecution.key("aex-1"), "AgentExecution/aex-1");
        assert_eq!(ResourceKind::Session.to_string(), "Session");
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (mut tx, mut rx) = mpsc::channel::<Execution>(1);
        tokio_test::assert_ok!(ExecutionSink::send(&mut tx, Execution::default()).await);
        assert!(rx.recv().await.is_some());

        drop(rx);
        let err = tokio_test::assert_err!(ExecutionSink::send(&mut tx, Execution::default()).await);
        assert_eq!(err, RelayError::Closed);
    }
}
