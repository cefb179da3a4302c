pub mod quantities;

pub use quantities::ResourceQuantities;

use crate::{GroupVersionKind, ResourceKey};
use k8s_openapi::api::core::v1::{Namespace, Pod, ResourceQuota};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Trait for the Kubernetes objects the controller reads and writes
pub trait Resource: Serialize + for<'de> Deserialize<'de> + Send + Sync {
    /// Get the GroupVersionKind
    fn gvk() -> GroupVersionKind;

    /// Get the metadata of this resource
    fn metadata(&self) -> &ObjectMeta;

    /// Whether objects of this kind live inside a namespace
    fn is_namespaced() -> bool {
        true
    }

    /// Object name, if set
    fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    /// Get the ResourceKey
    fn resource_key(&self) -> Result<ResourceKey, ResourceError> {
        let metadata = self.metadata();
        let name = metadata
            .name
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("metadata.name".to_string()))?;

        if !Self::is_namespaced() {
            return Ok(ResourceKey::cluster_scoped(Self::gvk(), name));
        }

        let namespace = metadata
            .namespace
            .as_ref()
            .ok_or_else(|| ResourceError::MissingField("metadata.namespace".to_string()))?;
        Ok(ResourceKey::new(Self::gvk(), namespace, name))
    }
}

/// Resource-related errors
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Validate a Kubernetes resource name (DNS-1123 subdomain)
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    // Must contain only lowercase alphanumeric, '-', or '.'
    // Must start and end with alphanumeric
    let chars: Vec<char> = name.chars().collect();

    if !chars[0].is_ascii_lowercase() && !chars[0].is_ascii_digit() {
        return false;
    }

    if !chars[chars.len() - 1].is_ascii_lowercase() && !chars[chars.len() - 1].is_ascii_digit() {
        return false;
    }

    chars
        .iter()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.')
}

impl Resource for Pod {
    fn gvk() -> GroupVersionKind {
        GroupVersionKind::pod()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl Resource for ResourceQuota {
    fn gvk() -> GroupVersionKind {
        GroupVersionKind::resource_quota()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl Resource for Namespace {
    fn gvk() -> GroupVersionKind {
        GroupVersionKind::namespace()
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn is_namespaced() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("debt-limit0"));
        assert!(is_valid_name("arrears-debt-scheduler"));
        assert!(is_valid_name("my.app"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("MyApp")); // uppercase
        assert!(!is_valid_name("-myapp")); // starts with dash
        assert!(!is_valid_name("myapp-")); // ends with dash
        assert!(!is_valid_name("my_app")); // underscore
    }

    #[test]
    fn test_pod_resource_key() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("nginx".to_string());
        pod.metadata.namespace = Some("tenant-a".to_string());

        let key = pod.resource_key().unwrap();
        assert_eq!(key.name, "nginx");
        assert_eq!(key.namespace, "tenant-a");
        assert_eq!(key.gvk.kind, "Pod");
    }

    #[test]
    fn test_pod_without_namespace_has_no_key() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("nginx".to_string());

        assert!(matches!(
            pod.resource_key().unwrap_err(),
            ResourceError::MissingField(field) if field == "metadata.namespace"
        ));
    }

    #[test]
    fn test_namespace_key_is_cluster_scoped() {
        let mut ns = Namespace::default();
        ns.metadata.name = Some("tenant-a".to_string());

        let key = ns.resource_key().unwrap();
        assert!(!key.is_namespaced());
        assert_eq!(key.gvk.kind, "Namespace");
    }
}
