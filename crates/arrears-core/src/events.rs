use crate::error::{ArrearsError, Result};
use crate::types::{GroupVersionKind, ResourceKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Watch event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Error,
}

/// A resource event emitted on every mutation of a cluster object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Type of watch event (ADDED, MODIFIED, DELETED)
    pub event_type: WatchEventType,
    /// GroupVersionKind of the resource
    pub gvk: GroupVersionKind,
    /// Full resource key (gvk + namespace + name)
    pub resource_key: ResourceKey,
    /// The serialized resource object
    pub object: serde_json::Value,
    /// Resource version at the time of the event
    pub resource_version: String,
}

impl ResourceEvent {
    /// Create an ADDED event
    pub fn added(
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self::new(WatchEventType::Added, resource_key, object, resource_version)
    }

    /// Create a MODIFIED event
    pub fn modified(
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self::new(WatchEventType::Modified, resource_key, object, resource_version)
    }

    /// Create a DELETED event
    pub fn deleted(
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self::new(WatchEventType::Deleted, resource_key, object, resource_version)
    }

    fn new(
        event_type: WatchEventType,
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self {
            event_type,
            gvk: resource_key.gvk.clone(),
            resource_key,
            object,
            resource_version,
        }
    }

    /// Decode the carried object into a typed watch event
    pub fn decode<T: DeserializeOwned>(&self) -> Result<WatchEvent<T>> {
        let object = serde_json::from_value(self.object.clone()).map_err(|e| {
            ArrearsError::serialization_error(
                format!("Failed to decode {} event object: {}", self.gvk, e),
                Some(Box::new(e)),
            )
        })?;
        Ok(WatchEvent {
            event_type: self.event_type.clone(),
            object,
        })
    }
}

/// Typed watch event, in Kubernetes wire format (`{"type": ..., "object": ...}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent<T> {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: T,
}

impl<T> WatchEvent<T> {
    pub fn is_deleted(&self) -> bool {
        self.event_type == WatchEventType::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;

    #[test]
    fn test_resource_event_serde_roundtrip() {
        let key = ResourceKey::new(GroupVersionKind::pod(), "default", "nginx");
        let object =
            serde_json::json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "nginx"}});

        let event = ResourceEvent::deleted(key, object.clone(), "7".to_string());

        let serialized = serde_json::to_string(&event).unwrap();
        let deserialized: ResourceEvent = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.event_type, WatchEventType::Deleted);
        assert_eq!(deserialized.resource_key.name, "nginx");
        assert_eq!(deserialized.gvk.kind, "Pod");
        assert_eq!(deserialized.object, object);
        assert_eq!(deserialized.resource_version, "7");
    }

    #[test]
    fn test_decode_typed_pod_event() {
        let key = ResourceKey::new(GroupVersionKind::pod(), "tenant-a", "worker");
        let object = serde_json::json!({"metadata": {"name": "worker", "namespace": "tenant-a"}});

        let event: WatchEvent<Pod> = ResourceEvent::added(key, object, "1".to_string())
            .decode()
            .unwrap();

        assert_eq!(event.event_type, WatchEventType::Added);
        assert_eq!(event.object.metadata.name.as_deref(), Some("worker"));
        assert!(!event.is_deleted());
    }

    #[test]
    fn test_decode_rejects_mismatched_object() {
        let key = ResourceKey::new(GroupVersionKind::pod(), "tenant-a", "worker");
        let event = ResourceEvent::added(key, serde_json::json!("not an object"), "1".into());

        let result: Result<WatchEvent<Pod>> = event.decode();
        assert!(result.is_err());
    }

    #[test]
    fn test_wire_format_uses_type_field() {
        let raw = r#"{"type":"DELETED","object":{"metadata":{"name":"worker"}}}"#;
        let event: WatchEvent<Pod> = serde_json::from_str(raw).unwrap();
        assert!(event.is_deleted());
        assert_eq!(event.object.metadata.name.as_deref(), Some("worker"));
    }
}
