pub mod common;
pub mod external;

use serde::de::DeserializeOwned;

use ticketflow_core::error::{Result, TicketflowError};

/// Decode an argument mapping, reporting failures against `operation`.
pub(crate) fn parse_args<T: DeserializeOwned>(operation: &str, args: serde_json::Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| TicketflowError::capability(operation, format!("invalid arguments: {}", e)))
}
