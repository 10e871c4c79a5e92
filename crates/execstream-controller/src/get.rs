//! Get pipeline.

use std::sync::Arc;

use execstream_core::{Execution, Pipeline, ResourceStore};

use crate::steps::{LoadExecution, ValidateExecutionId};

pub(crate) fn pipeline(store: &Arc<dyn ResourceStore>) -> Pipeline<String, Execution> {
    Pipeline::builder("agent-execution-get")
        .add_step(ValidateExecutionId)
        .add_step(LoadExecution::new(Arc::clone(store)))
        .build()
}
