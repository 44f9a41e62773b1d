use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use ticketflow_core::error::{Result, TicketflowError};
use ticketflow_core::traits::{Capability, CapabilityProvider};
use ticketflow_core::types::{CapabilityDefinition, ProviderRole};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry of available capabilities, dispatching invocations by name.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    call_timeout: Duration,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the default per-call time budget.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Register a capability. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, capability: impl Capability) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, Arc::new(capability));
    }

    /// Unregister a capability by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.capabilities.remove(name).is_some()
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// List all registered capability names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Names registered under a provider role, sorted.
    pub fn list_role(&self, role: ProviderRole) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .capabilities
            .iter()
            .filter(|(_, c)| c.role() == role)
            .map(|(n, _)| n.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Capability descriptions.
    pub fn definitions(&self) -> Vec<CapabilityDefinition> {
        self.capabilities
            .values()
            .map(|c| CapabilityDefinition {
                name: c.name().to_string(),
                description: c.description().to_string(),
                role: c.role(),
                input_schema: c.input_schema(),
            })
            .collect()
    }

    /// Execute a capability by name under its time budget.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let capability = self
            .get(name)
            .ok_or_else(|| TicketflowError::capability(name, "no provider registered"))?;

        let timeout = capability
            .timeout_secs()
            .map(Duration::from_secs)
            .unwrap_or(self.call_timeout);

        debug!(operation = name, role = ?capability.role(), "Invoking capability");

        match tokio::time::timeout(timeout, capability.invoke(args)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = name, timeout_ms = timeout.as_millis() as u64, "Capability timed out");
                Err(TicketflowError::StageTimeout {
                    scope: format!("capability {}", name),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Create a registry with all built-in capabilities registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // ── Computation-only (5) ────────────────────────────────
        registry.register(crate::builtin::common::ParseRequestText);
        registry.register(crate::builtin::common::NormalizeFields);
        registry.register(crate::builtin::common::AddFlagsCalculations);
        registry.register(crate::builtin::common::SolutionEvaluation);
        registry.register(crate::builtin::common::ResponseGeneration);

        // ── Externally-dependent (7) ────────────────────────────
        registry.register(crate::builtin::external::ExtractEntities::default());
        registry.register(crate::builtin::external::EnrichRecords);
        registry.register(crate::builtin::external::KnowledgeBaseSearch::default());
        registry.register(crate::builtin::external::EscalationDecision);
        registry.register(crate::builtin::external::UpdateTicket);
        registry.register(crate::builtin::external::CloseTicket);
        registry.register(crate::builtin::external::TriggerNotifications);

        registry
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProvider for CapabilityRegistry {
    fn invoke<'a>(
        &'a self,
        operation: &'a str,
        args: serde_json::Value,
    ) -> BoxFuture<'a, Result<serde_json::Value>> {
        Box::pin(self.execute(operation, args))
    }
}
