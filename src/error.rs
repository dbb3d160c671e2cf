//! Crate-wide error types.

use thiserror::Error;

use crate::schema::SchemaError;
use crate::sds::SdsError;

#[derive(Debug, Error)]
pub enum JobsetError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("A job handler is already registered for this process")]
    RegistrationConflict,

    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Schema reference cycle: {0}")]
    SchemaCycle(String),

    #[error("SDS error: {0}")]
    Sds(#[from] SdsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classifies why an invocation produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HardStop {
    /// The assembled output failed egress validation.
    EgressValidation,
    /// A bulk handler failed or broke the one-output-per-input contract.
    BulkHandler,
    /// A direct-mode event was not a valid jobset.
    IngressValidation,
}

impl std::fmt::Display for HardStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardStop::EgressValidation => write!(f, "egress validation"),
            HardStop::BulkHandler => write!(f, "bulk handler"),
            HardStop::IngressValidation => write!(f, "ingress validation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_conflict_display() {
        let err = JobsetError::RegistrationConflict;
        assert_eq!(
            err.to_string(),
            "A job handler is already registered for this process"
        );
    }

    #[test]
    fn schema_error_converts() {
        let err: JobsetError = SchemaError::new("$.jobs", "expected array").into();
        assert_eq!(
            err.to_string(),
            "Schema validation failed: $.jobs: expected array"
        );
    }

    #[test]
    fn hard_stop_display() {
        assert_eq!(HardStop::EgressValidation.to_string(), "egress validation");
        assert_eq!(HardStop::BulkHandler.to_string(), "bulk handler");
    }
}
