//! Arrears Core - Fundamental types for the Arrears debt controller
//!
//! This crate provides:
//! - The namespace debt status model and its annotation keys
//! - Error types with miette diagnostics
//! - Type-safe resource keys and watch events
//! - Serialization helpers

pub mod debt;
pub mod error;
pub mod events;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use debt::{
    DebtStatus, DEBT_STATUS_ANNOTATION, DEFAULT_QUOTA_NAME, DEFAULT_SCHEDULER_NAME,
    PREVIOUS_SCHEDULER_ANNOTATION,
};
pub use error::{ArrearsError, Result};
pub use events::{ResourceEvent, WatchEvent, WatchEventType};
pub use resources::{is_valid_name, Resource, ResourceError, ResourceQuantities};
pub use types::{GroupVersionKind, ResourceKey};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Namespace, Pod, ResourceQuota};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Deserialize a value from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        ArrearsError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_deserialization() {
        let yaml = "metadata:\n  name: tenant-a\n  annotations:\n    arrears.io/debt-status: Suspend\n";
        let ns: Namespace = from_yaml(yaml).unwrap();
        assert_eq!(ns.metadata.name.as_deref(), Some("tenant-a"));
        assert_eq!(DebtStatus::of(&ns), Some(DebtStatus::SuspendRequested));
    }

    #[test]
    fn test_from_yaml_reports_serialization_error() {
        let result: Result<Pod> = from_yaml("metadata: [unclosed");
        assert!(matches!(
            result.unwrap_err(),
            ArrearsError::SerializationError { .. }
        ));
    }
}
