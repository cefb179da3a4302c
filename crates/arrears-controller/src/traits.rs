use crate::error::Result;
use arrears_core::WatchEvent;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use k8s_openapi::api::core::v1::{Namespace, Pod, ResourceQuota};

/// Stream of typed watch events. Ends when the server closes the watch.
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>>>;

/// Trait for the cluster API the controller drives
///
/// This trait abstracts over the orchestration API server. `ApiClient` talks
/// to a real server over HTTP; `MockCluster` keeps everything in memory for
/// tests.
///
/// A watch returned by `watch_pods` / `watch_namespaces` must already be
/// established when the future resolves: every mutation issued afterwards is
/// guaranteed to show up on the stream.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    // --- Namespaces ---

    /// Read a namespace by name
    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    /// Replace a namespace (metadata updates such as annotations)
    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace>;

    /// Watch all namespaces
    async fn watch_namespaces(&self) -> Result<WatchStream<Namespace>>;

    // --- Pods ---

    /// List the pods of a namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    /// Create a pod
    async fn create_pod(&self, pod: &Pod) -> Result<Pod>;

    /// Delete a pod. Returns `NotFound` if it is already gone.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Watch the pods of a namespace
    async fn watch_pods(&self, namespace: &str) -> Result<WatchStream<Pod>>;

    // --- Resource quotas ---

    /// Read a resource quota
    async fn get_resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota>;

    /// Create a resource quota. Returns `AlreadyExists` if present.
    async fn create_resource_quota(&self, quota: &ResourceQuota) -> Result<ResourceQuota>;

    /// Delete a resource quota. Returns `NotFound` if absent.
    async fn delete_resource_quota(&self, namespace: &str, name: &str) -> Result<()>;
}
