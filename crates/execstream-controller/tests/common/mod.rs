#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use execstream_controller::ExecutionController;
use execstream_core::{
    Execution, ExecutionPhase, ExecutionSpec, ExecutionStatus, ResourceMetadata, StreamBroker,
    WorkflowStarter,
};
use execstream_store::MemoryStore;

pub fn controller(starter: Option<Arc<dyn WorkflowStarter>>) -> Arc<ExecutionController> {
    controller_with_store(Arc::new(MemoryStore::new()), starter)
}

pub fn controller_with_store(
    store: Arc<MemoryStore>,
    starter: Option<Arc<dyn WorkflowStarter>>,
) -> Arc<ExecutionController> {
    Arc::new(ExecutionController::new(
        store,
        Arc::new(StreamBroker::new()),
        starter,
    ))
}

pub fn request(name: &str, session_id: &str) -> Execution {
    Execution {
        metadata: ResourceMetadata {
            name: name.to_string(),
            ..Default::default()
        },
        spec: ExecutionSpec {
            session_id: session_id.to_string(),
            agent_id: String::new(),
            message: "summarize the repository".to_string(),
        },
        status: ExecutionStatus::default(),
    }
}

pub async fn pending_execution(controller: &ExecutionController) -> Execution {
    controller
        .create(request("Review PR", "ses-1"))
        .await
        .expect("create execution")
}

pub fn status(phase: ExecutionPhase) -> ExecutionStatus {
    ExecutionStatus {
        phase,
        ..Default::default()
    }
}

pub async fn wait_for_subscribers(controller: &ExecutionController, id: &str, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.subscriber_count(id) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscribers did not register in time");
}
