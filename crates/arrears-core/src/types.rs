use serde::{Deserialize, Serialize};
use std::fmt;

/// GroupVersionKind uniquely identifies a Kubernetes resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group (e.g., "", "apps", "batch")
    pub group: String,
    /// API version (e.g., "v1", "v1beta1")
    pub version: String,
    /// Resource kind (e.g., "Pod", "Deployment")
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a new GVK
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Core v1 Pod
    pub fn pod() -> Self {
        Self::new("", "v1", "Pod")
    }

    /// Core v1 Namespace
    pub fn namespace() -> Self {
        Self::new("", "v1", "Namespace")
    }

    /// Core v1 ResourceQuota
    pub fn resource_quota() -> Self {
        Self::new("", "v1", "ResourceQuota")
    }

    /// Get the apiVersion string (group/version or just version)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Get the full API path segment
    pub fn api_path(&self) -> String {
        if self.group.is_empty() {
            format!("api/{}", self.version)
        } else {
            format!("apis/{}/{}", self.group, self.version)
        }
    }

    /// Get the resource name (lowercase, plural)
    pub fn resource_name(&self) -> String {
        // Simple pluralization - should be enhanced for production
        let lower = self.kind.to_lowercase();
        if lower.ends_with('s') {
            format!("{}es", lower)
        } else if lower.ends_with('y') {
            format!("{}ies", &lower[..lower.len() - 1])
        } else {
            format!("{}s", lower)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// ResourceKey uniquely identifies a specific resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// GroupVersionKind of the resource
    pub gvk: GroupVersionKind,
    /// Namespace (empty for cluster-scoped resources)
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl ResourceKey {
    /// Create a new ResourceKey
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a cluster-scoped ResourceKey
    pub fn cluster_scoped(gvk: GroupVersionKind, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: String::new(),
            name: name.into(),
        }
    }

    /// Check if this is a namespaced resource
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Get the API path for this resource
    pub fn api_path(&self) -> String {
        let base = self.gvk.api_path();
        let resource = self.gvk.resource_name();

        if self.is_namespaced() {
            format!("/{}/namespaces/{}/{}/{}", base, self.namespace, resource, self.name)
        } else {
            format!("/{}/{}/{}", base, resource, self.name)
        }
    }

    /// Get the API path for the collection (without name)
    pub fn collection_path(&self) -> String {
        let base = self.gvk.api_path();
        let resource = self.gvk.resource_name();

        if self.is_namespaced() {
            format!("/{}/namespaces/{}/{}", base, self.namespace, resource)
        } else {
            format!("/{}/{}", base, resource)
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespaced() {
            write!(f, "{}/{}/{}", self.gvk, self.namespace, self.name)
        } else {
            write!(f, "{}/{}", self.gvk, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvk_api_version() {
        assert_eq!(GroupVersionKind::pod().api_version(), "v1");

        let gvk = GroupVersionKind::new("apps", "v1", "Deployment");
        assert_eq!(gvk.api_version(), "apps/v1");
        assert_eq!(gvk.api_path(), "apis/apps/v1");
        assert_eq!(gvk.resource_name(), "deployments");
        assert_eq!(gvk.to_string(), "apps/v1/Deployment");
    }

    #[test]
    fn test_well_known_gvks() {
        assert_eq!(GroupVersionKind::pod().resource_name(), "pods");
        assert_eq!(GroupVersionKind::namespace().resource_name(), "namespaces");
        assert_eq!(
            GroupVersionKind::resource_quota().resource_name(),
            "resourcequotas"
        );
        assert_eq!(GroupVersionKind::resource_quota().api_version(), "v1");
    }

    #[test]
    fn test_resource_key_api_path() {
        let key = ResourceKey::new(GroupVersionKind::pod(), "default", "nginx");
        assert_eq!(key.api_path(), "/api/v1/namespaces/default/pods/nginx");

        let key = ResourceKey::cluster_scoped(GroupVersionKind::namespace(), "tenant-a");
        assert_eq!(key.api_path(), "/api/v1/namespaces/tenant-a");
    }

    #[test]
    fn test_resource_key_collection_path() {
        let key = ResourceKey::new(GroupVersionKind::resource_quota(), "tenant-a", "debt-limit0");
        assert_eq!(
            key.collection_path(),
            "/api/v1/namespaces/tenant-a/resourcequotas"
        );
        assert_eq!(
            key.api_path(),
            "/api/v1/namespaces/tenant-a/resourcequotas/debt-limit0"
        );

        let key = ResourceKey::cluster_scoped(GroupVersionKind::namespace(), "");
        assert_eq!(key.collection_path(), "/api/v1/namespaces");
    }
}
