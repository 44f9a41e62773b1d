use thiserror::Error;

#[derive(Debug, Error)]
pub enum TicketflowError {
    // Definition errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Run errors
    #[error("Precondition failed for stage {stage}: {field} is missing")]
    Precondition { stage: String, field: String },

    #[error("Capability failed: {operation}: {cause}")]
    Capability { operation: String, cause: String },

    #[error("Timeout after {timeout_ms}ms: {scope}")]
    StageTimeout { scope: String, timeout_ms: u64 },

    #[error("Router at {node} produced unhandled label {label}")]
    UnhandledRouteLabel { node: String, label: String },

    #[error("State violation in stage {stage}: {detail}")]
    StateViolation { stage: String, detail: String },

    // Config file errors
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TicketflowError {
    /// Build a capability error from any displayable cause.
    pub fn capability(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Capability {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Attribute a state violation raised by a `WorkflowState` setter to the
    /// stage that attempted the write.
    pub fn in_stage(self, name: &str) -> Self {
        match self {
            Self::StateViolation { stage, detail } if stage.is_empty() => Self::StateViolation {
                stage: name.to_string(),
                detail,
            },
            other => other,
        }
    }

    /// Stable kind string for failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::ConfigNotFound(_) => "configuration_error",
            Self::Precondition { .. } => "precondition_error",
            Self::Capability { .. } => "capability_error",
            Self::StageTimeout { .. } => "stage_timeout",
            Self::UnhandledRouteLabel { .. } => "unhandled_route_label",
            Self::StateViolation { .. } => "state_violation",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, TicketflowError>;
