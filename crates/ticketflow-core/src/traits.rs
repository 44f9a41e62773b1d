use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::error::{Result, TicketflowError};
use crate::state::{StateField, WorkflowState};
use crate::types::ProviderRole;

/// One atomic operation with a fixed input/output shape.
pub trait Capability: Send + Sync + 'static {
    /// Operation name used for dispatch.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Provider role (computation-only or externally-dependent).
    fn role(&self) -> ProviderRole;

    /// JSON Schema for the argument mapping.
    fn input_schema(&self) -> serde_json::Value;

    /// Run the operation.
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Per-operation timeout override in seconds.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }
}

/// The only way stages reach capabilities.
///
/// Any implementation is substitutable: a name-dispatching registry,
/// a remote client, or a deterministic test double.
pub trait CapabilityProvider: Send + Sync {
    fn invoke<'a>(
        &'a self,
        operation: &'a str,
        args: serde_json::Value,
    ) -> BoxFuture<'a, Result<serde_json::Value>>;
}

/// A named unit of work over the workflow state.
pub trait Stage: Send + Sync + 'static {
    /// Node name.
    fn name(&self) -> &str;

    /// Fields that must be populated before the stage runs.
    fn requires(&self) -> &[StateField] {
        &[]
    }

    /// Consume the current state and return the next one.
    fn run<'a>(
        &'a self,
        state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>>;
}

/// Invoke `operation` and decode its result mapping into `T`.
///
/// A non-object result, or one that does not match `T`, is reported as a
/// capability error for that operation.
pub async fn invoke_as<T: DeserializeOwned>(
    provider: &dyn CapabilityProvider,
    operation: &str,
    args: serde_json::Value,
) -> Result<T> {
    let raw = provider.invoke(operation, args).await?;
    if !raw.is_object() {
        return Err(TicketflowError::capability(
            operation,
            format!("expected a result mapping, got {}", raw),
        ));
    }
    serde_json::from_value(raw)
        .map_err(|e| TicketflowError::capability(operation, format!("malformed result: {}", e)))
}
