// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Arrears operations
#[derive(Error, Debug, Diagnostic)]
pub enum ArrearsError {
    /// Invalid resource
    #[error("Invalid resource: {reason}")]
    #[diagnostic(
        code(arrears::invalid_resource),
        help("{suggestion}")
    )]
    InvalidResource {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(arrears::serialization_error),
        help("Ensure the resource format is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Arrears operations
pub type Result<T> = std::result::Result<T, ArrearsError>;

impl ArrearsError {
    /// Create an InvalidResource error
    pub fn invalid_resource(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidResource {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

impl From<crate::resources::ResourceError> for ArrearsError {
    fn from(e: crate::resources::ResourceError) -> Self {
        Self::invalid_resource(
            e.to_string(),
            "Every object handled by the controller needs metadata.name set",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceError;

    #[test]
    fn test_error_creation() {
        let err = ArrearsError::serialization_error("bad frame", None);
        assert!(matches!(err, ArrearsError::SerializationError { .. }));

        let err = ArrearsError::invalid_resource("missing name", "set metadata.name");
        assert!(matches!(err, ArrearsError::InvalidResource { .. }));
    }

    #[test]
    fn test_resource_error_conversion() {
        let err: ArrearsError = ResourceError::MissingField("metadata.name".to_string()).into();
        assert!(matches!(err, ArrearsError::InvalidResource { .. }));
        assert!(err.to_string().contains("metadata.name"));
    }
}
