use crate::error::{ControllerError, Result};
use crate::traits::{ClusterApi, WatchStream};
use arrears_core::{
    ArrearsError, GroupVersionKind, Resource, ResourceEvent, ResourceKey, ResourceQuantities,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Pod, ResourceQuota};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use uuid::Uuid;

const EVENT_BUS_CAPACITY: usize = 4096;

/// API operations that can be made to fail via `MockCluster::fail_next`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    GetNamespace,
    UpdateNamespace,
    WatchNamespaces,
    ListPods,
    CreatePod,
    DeletePod,
    WatchPods,
    GetResourceQuota,
    CreateResourceQuota,
    DeleteResourceQuota,
}

/// Mutation recorded by `MockCluster`, in the order the cluster applied it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOp {
    PodCreated {
        namespace: String,
        name: String,
        scheduler_name: Option<String>,
    },
    PodDeleteRequested {
        namespace: String,
        name: String,
    },
    /// The DELETED event for a pod was published to watchers
    PodDeletionNotified {
        namespace: String,
        name: String,
    },
    QuotaCreated {
        namespace: String,
        name: String,
    },
    QuotaDeleted {
        namespace: String,
        name: String,
    },
    NamespaceUpdated {
        name: String,
    },
}

type ObjectKey = (String, String);

struct MockState {
    namespaces: BTreeMap<String, Namespace>,
    pods: BTreeMap<ObjectKey, Pod>,
    /// Deleted pods whose DELETED event has not been published yet.
    /// Their names stay reserved.
    terminating: HashSet<ObjectKey>,
    quotas: BTreeMap<ObjectKey, ResourceQuota>,
    resource_version: u64,
    faults: Vec<MockOp>,
    log: Vec<ClusterOp>,
    event_tx: broadcast::Sender<ResourceEvent>,
}

impl MockState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn take_fault(&mut self, op: MockOp) -> Result<()> {
        if let Some(idx) = self.faults.iter().position(|f| *f == op) {
            self.faults.remove(idx);
            return Err(ControllerError::api_error(format!(
                "injected failure for {:?}",
                op
            )));
        }
        Ok(())
    }

    fn publish<T: Resource>(
        &self,
        make: fn(ResourceKey, serde_json::Value, String) -> ResourceEvent,
        object: &T,
        resource_version: &str,
    ) -> Result<()> {
        let key = object.resource_key()?;
        let value = serde_json::to_value(object).map_err(|e| {
            ArrearsError::serialization_error(
                format!("Failed to serialize {}: {}", key, e),
                Some(Box::new(e)),
            )
        })?;
        // No subscribers is fine
        let _ = self
            .event_tx
            .send(make(key, value, resource_version.to_string()));
        Ok(())
    }

    /// Quota admission: reject pods whose limits exceed any quota of the namespace
    fn admit(&self, namespace: &str, pod: &Pod) -> Result<()> {
        let usage = ResourceQuantities::pod_limits(pod);
        let pod_name = pod.name().unwrap_or_default();

        let quotas = self
            .quotas
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, name), quota)| (name, quota));

        for (quota_name, quota) in quotas {
            let Some(hard) = quota.spec.as_ref().and_then(|s| s.hard.as_ref()) else {
                continue;
            };

            if let Some(limit) = hard.get("limits.cpu") {
                let limit = ResourceQuantities::parse_cpu(&limit.0).unwrap_or(0);
                if usage.cpu_millicores > limit {
                    return Err(ControllerError::forbidden(
                        "Pod",
                        pod_name,
                        format!(
                            "exceeded quota: {}, requested: limits.cpu={}m, limited: limits.cpu={}m",
                            quota_name, usage.cpu_millicores, limit
                        ),
                    ));
                }
            }

            if let Some(limit) = hard.get("limits.memory") {
                let limit = ResourceQuantities::parse_memory(&limit.0).unwrap_or(0);
                if usage.memory_bytes > limit {
                    return Err(ControllerError::forbidden(
                        "Pod",
                        pod_name,
                        format!(
                            "exceeded quota: {}, requested: limits.memory={}, limited: limits.memory={}",
                            quota_name, usage.memory_bytes, limit
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    fn finish_pod_deletion(&mut self, key: ObjectKey, pod: Pod) -> Result<()> {
        self.terminating.remove(&key);
        let version = self.next_version();
        self.publish(ResourceEvent::deleted, &pod, &version)?;
        self.log.push(ClusterOp::PodDeletionNotified {
            namespace: key.0,
            name: key.1,
        });
        Ok(())
    }
}

/// Deletion behaviour of the mock API server
#[derive(Debug, Clone, Copy)]
enum DeletionMode {
    /// DELETED is published as part of the delete call
    Immediate,
    /// DELETED is published after a grace period; the name stays taken until then
    Delayed(Duration),
    /// DELETED is never published; the name stays taken forever
    Stuck,
}

/// In-memory cluster for testing the controller without an API server
///
/// Keeps namespaces, pods and resource quotas in memory and broadcasts a
/// `ResourceEvent` for every mutation, like the API server's event bus.
/// Enforces the parts of API server behaviour the controller depends on:
/// name uniqueness (including pods still terminating), quota admission on
/// pod creation and rejection of creates that carry a resourceVersion.
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
    deletion: DeletionMode,
}

impl MockCluster {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(MockState {
                namespaces: BTreeMap::new(),
                pods: BTreeMap::new(),
                terminating: HashSet::new(),
                quotas: BTreeMap::new(),
                resource_version: 0,
                faults: Vec::new(),
                log: Vec::new(),
                event_tx,
            })),
            deletion: DeletionMode::Immediate,
        }
    }

    /// Publish pod DELETED events only after `delay`, keeping the name reserved
    pub fn with_deletion_delay(mut self, delay: Duration) -> Self {
        self.deletion = DeletionMode::Delayed(delay);
        self
    }

    /// Never complete pod deletions (e.g. a finalizer nobody removes)
    pub fn with_stuck_deletions(mut self) -> Self {
        self.deletion = DeletionMode::Stuck;
        self
    }

    /// Add a namespace, publishing an ADDED event
    pub async fn insert_namespace(&self, mut namespace: Namespace) -> Result<()> {
        let mut state = self.state.write().await;
        let name = namespace.resource_key()?.name;
        let version = state.next_version();
        namespace.metadata.resource_version = Some(version.clone());
        state.publish(ResourceEvent::added, &namespace, &version)?;
        state.namespaces.insert(name, namespace);
        Ok(())
    }

    /// Remove a namespace, publishing a DELETED event
    pub async fn remove_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let namespace = state
            .namespaces
            .remove(name)
            .ok_or_else(|| ControllerError::not_found("Namespace", name))?;
        let version = state.next_version();
        state.publish(ResourceEvent::deleted, &namespace, &version)?;
        Ok(())
    }

    /// Seed a pod as-is: no admission, no event, not logged
    pub async fn insert_pod(&self, pod: Pod) -> Result<()> {
        let key = pod.resource_key()?;
        self.state
            .write()
            .await
            .pods
            .insert((key.namespace, key.name), pod);
        Ok(())
    }

    /// Make the next call of `op` fail with a transient API error
    pub async fn fail_next(&self, op: MockOp) {
        self.state.write().await.faults.push(op);
    }

    /// End every open watch stream
    pub async fn close_watches(&self) {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        self.state.write().await.event_tx = event_tx;
    }

    /// Mutations applied so far, in order
    pub async fn log(&self) -> Vec<ClusterOp> {
        self.state.read().await.log.clone()
    }

    pub async fn clear_log(&self) {
        self.state.write().await.log.clear();
    }

    /// Current pod, if present
    pub async fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state
            .read()
            .await
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    async fn watch<T>(&self, gvk: GroupVersionKind, namespace: Option<String>) -> WatchStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let rx = self.state.read().await.event_tx.subscribe();

        BroadcastStream::new(rx)
            .filter_map(move |result| {
                let gvk = gvk.clone();
                let namespace = namespace.clone();
                async move {
                    let event = match result {
                        Ok(event) => event,
                        Err(BroadcastStreamRecvError::Lagged(n)) => {
                            return Some(Err(ControllerError::watch_failed(format!(
                                "watch fell behind by {} events",
                                n
                            ))));
                        }
                    };

                    if event.gvk != gvk {
                        return None;
                    }

                    if let Some(ref ns) = namespace {
                        if event.resource_key.namespace != *ns {
                            return None;
                        }
                    }

                    Some(event.decode::<T>().map_err(ControllerError::from))
                }
            })
            .boxed()
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::GetNamespace)?;
        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| ControllerError::not_found("Namespace", name))
    }

    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::UpdateNamespace)?;

        let name = namespace.resource_key()?.name;
        if !state.namespaces.contains_key(&name) {
            return Err(ControllerError::not_found("Namespace", name));
        }

        let mut updated = namespace.clone();
        let version = state.next_version();
        updated.metadata.resource_version = Some(version.clone());
        state.publish(ResourceEvent::modified, &updated, &version)?;
        state.log.push(ClusterOp::NamespaceUpdated { name: name.clone() });
        state.namespaces.insert(name, updated.clone());

        debug!("Mock: namespace updated: {}", namespace.name().unwrap_or_default());
        Ok(updated)
    }

    async fn watch_namespaces(&self) -> Result<WatchStream<Namespace>> {
        self.state
            .write()
            .await
            .take_fault(MockOp::WatchNamespaces)?;
        Ok(self.watch(GroupVersionKind::namespace(), None).await)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::ListPods)?;
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::CreatePod)?;

        let key = pod.resource_key()?;
        if pod.metadata.resource_version.is_some() {
            return Err(ArrearsError::invalid_resource(
                format!("resourceVersion should not be set on objects to be created: {}", key),
                "Clear metadata.resourceVersion before creating",
            )
            .into());
        }

        let object_key = (key.namespace.clone(), key.name.clone());
        if state.pods.contains_key(&object_key) || state.terminating.contains(&object_key) {
            return Err(ControllerError::already_exists("Pod", key.to_string()));
        }

        state.admit(&key.namespace, pod)?;

        let mut created = pod.clone();
        created.metadata.uid = Some(Uuid::new_v4().to_string());
        let version = state.next_version();
        created.metadata.resource_version = Some(version.clone());

        state.publish(ResourceEvent::added, &created, &version)?;
        state.log.push(ClusterOp::PodCreated {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            scheduler_name: created.spec.as_ref().and_then(|s| s.scheduler_name.clone()),
        });
        state.pods.insert(object_key, created.clone());

        debug!("Mock: pod created: {}", key);
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::DeletePod)?;

        let key = (namespace.to_string(), name.to_string());
        let pod = state
            .pods
            .remove(&key)
            .ok_or_else(|| ControllerError::not_found("Pod", format!("{}/{}", namespace, name)))?;

        state.log.push(ClusterOp::PodDeleteRequested {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        debug!("Mock: pod delete requested: {}/{}", namespace, name);

        match self.deletion {
            DeletionMode::Immediate => state.finish_pod_deletion(key, pod)?,
            DeletionMode::Stuck => {
                state.terminating.insert(key);
            }
            DeletionMode::Delayed(delay) => {
                state.terminating.insert(key.clone());
                let shared = self.state.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut state = shared.write().await;
                    if let Err(e) = state.finish_pod_deletion(key, pod) {
                        warn!("Mock: failed to publish pod deletion: {}", e);
                    }
                });
            }
        }

        Ok(())
    }

    async fn watch_pods(&self, namespace: &str) -> Result<WatchStream<Pod>> {
        self.state.write().await.take_fault(MockOp::WatchPods)?;
        Ok(self
            .watch(GroupVersionKind::pod(), Some(namespace.to_string()))
            .await)
    }

    async fn get_resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::GetResourceQuota)?;
        state
            .quotas
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ControllerError::not_found("ResourceQuota", format!("{}/{}", namespace, name))
            })
    }

    async fn create_resource_quota(&self, quota: &ResourceQuota) -> Result<ResourceQuota> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::CreateResourceQuota)?;

        let key = quota.resource_key()?;
        let object_key = (key.namespace.clone(), key.name.clone());
        if state.quotas.contains_key(&object_key) {
            return Err(ControllerError::already_exists(
                "ResourceQuota",
                key.to_string(),
            ));
        }

        let mut created = quota.clone();
        created.metadata.uid = Some(Uuid::new_v4().to_string());
        let version = state.next_version();
        created.metadata.resource_version = Some(version.clone());

        state.publish(ResourceEvent::added, &created, &version)?;
        state.log.push(ClusterOp::QuotaCreated {
            namespace: key.namespace,
            name: key.name,
        });
        state.quotas.insert(object_key, created.clone());
        Ok(created)
    }

    async fn delete_resource_quota(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.take_fault(MockOp::DeleteResourceQuota)?;

        let quota = state
            .quotas
            .remove(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| {
                ControllerError::not_found("ResourceQuota", format!("{}/{}", namespace, name))
            })?;

        let version = state.next_version();
        state.publish(ResourceEvent::deleted, &quota, &version)?;
        state.log.push(ClusterOp::QuotaDeleted {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }
}
