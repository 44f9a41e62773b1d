use futures::future::BoxFuture;

use ticketflow_core::error::Result;
use ticketflow_core::traits::{CapabilityProvider, Stage};
use ticketflow_core::WorkflowState;

use super::{COMPLETE, INTAKE, STAGE_PREFIX};

/// Accepts the payload. No capability calls.
pub struct Intake;

impl Stage for Intake {
    fn name(&self) -> &str {
        INTAKE
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        _capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            state.append_log(format!("{}{} - Payload accepted.", STAGE_PREFIX, INTAKE));
            Ok(state)
        })
    }
}

/// Final node of the resolve path.
pub struct Complete;

impl Stage for Complete {
    fn name(&self) -> &str {
        COMPLETE
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        _capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            state.append_log(format!("{}{} - Workflow finished.", STAGE_PREFIX, COMPLETE));
            Ok(state)
        })
    }
}
