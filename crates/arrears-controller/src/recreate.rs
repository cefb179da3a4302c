use crate::error::{ControllerError, Result};
use crate::traits::{ClusterApi, WatchStream};
use arrears_core::{Resource, PREVIOUS_SCHEDULER_ANNOTATION};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Copy of `pod` that can be submitted as a new generation: server-assigned
/// identity removed, node binding and status cleared
fn next_generation(pod: &Pod) -> Pod {
    let mut clone = pod.clone();
    clone.metadata.resource_version = None;
    clone.metadata.uid = None;
    clone.metadata.creation_timestamp = None;
    clone.metadata.deletion_timestamp = None;
    clone.metadata.deletion_grace_period_seconds = None;
    if let Some(spec) = clone.spec.as_mut() {
        spec.node_name = None;
    }
    clone.status = None;
    clone
}

/// Replacement for a running pod that parks it under `scheduler_name`,
/// remembering the scheduler it had in an annotation
pub fn parked_replacement(pod: &Pod, scheduler_name: &str) -> Pod {
    let previous = pod
        .spec
        .as_ref()
        .and_then(|s| s.scheduler_name.clone())
        .unwrap_or_default();

    let mut clone = next_generation(pod);
    clone.spec.get_or_insert_with(Default::default).scheduler_name =
        Some(scheduler_name.to_string());
    clone
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(PREVIOUS_SCHEDULER_ANNOTATION.to_string(), previous);
    clone
}

/// Replacement for a parked pod that hands it back to the scheduler recorded
/// at parking time, or to the cluster default when none was recorded
pub fn restored_replacement(pod: &Pod) -> Pod {
    let mut clone = next_generation(pod);

    let previous = clone
        .metadata
        .annotations
        .as_mut()
        .and_then(|a| a.remove(PREVIOUS_SCHEDULER_ANNOTATION));
    if clone
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.is_empty())
    {
        clone.metadata.annotations = None;
    }

    clone.spec.get_or_insert_with(Default::default).scheduler_name =
        previous.filter(|s| !s.is_empty());
    clone
}

/// Replaces a pod with a new generation of the same name
///
/// The scheduler name of a pod cannot be changed in place, so the pod is
/// deleted and created again. The sequence is:
///
/// 1. open a watch on the namespace's pods,
/// 2. delete the old pod,
/// 3. wait (bounded) for the DELETED event carrying its name,
/// 4. create the replacement.
///
/// Watching before deleting means the DELETED event cannot be missed, and
/// creating only after it means the old and new generation never coexist.
///
/// Once the old pod is deleted the replacement is the only copy of its spec.
/// If the wait or the create fails, the replacement is held and
/// `complete_pending` creates it on a later pass.
pub struct PodRecreator {
    api: Arc<dyn ClusterApi>,
    timeout: Duration,
    pending: Mutex<BTreeMap<(String, String), Pod>>,
}

impl PodRecreator {
    /// `timeout` bounds the wait for a deletion beyond the pod's own
    /// termination grace period
    pub fn new(api: Arc<dyn ClusterApi>, timeout: Duration) -> Self {
        Self {
            api,
            timeout,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Delete `old` and create `replacement` once the deletion is confirmed
    pub async fn recreate(&self, old: &Pod, replacement: &Pod) -> Result<Pod> {
        let key = old.resource_key()?;
        let (namespace, name) = (key.namespace.as_str(), key.name.as_str());

        let mut events = self.api.watch_pods(namespace).await?;

        match self.api.delete_pod(namespace, name).await {
            Ok(()) => {
                debug!(namespace, pod = name, "Waiting for pod deletion");
                let wait = self.deletion_timeout(old);
                if let Err(e) = self.await_deletion(&mut events, namespace, name, wait).await {
                    self.hold(namespace, name, replacement).await;
                    return Err(e);
                }
            }
            Err(e) if e.is_not_found() => {
                debug!(namespace, pod = name, "Pod already gone, creating replacement");
            }
            Err(e) => return Err(e),
        }
        drop(events);

        self.create_replacement(namespace, name, replacement).await
    }

    /// True if a replacement in `namespace` is still waiting to be created
    pub async fn has_pending(&self, namespace: &str) -> bool {
        self.pending
            .lock()
            .await
            .keys()
            .any(|(ns, _)| ns == namespace)
    }

    /// Create every held replacement of `namespace`, waiting out old
    /// generations that are still terminating. Stops at the first failure;
    /// whatever is left stays held.
    pub async fn complete_pending(&self, namespace: &str) -> Result<usize> {
        let held: Vec<(String, Pod)> = self
            .pending
            .lock()
            .await
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, name), pod)| (name.clone(), pod.clone()))
            .collect();

        for (name, replacement) in &held {
            self.complete(namespace, name, replacement).await?;
        }
        Ok(held.len())
    }

    async fn complete(&self, namespace: &str, name: &str, replacement: &Pod) -> Result<()> {
        let mut events = self.api.watch_pods(namespace).await?;

        match self.api.create_pod(replacement).await {
            Ok(_) => {
                self.release(namespace, name).await;
                info!(namespace, pod = name, "Created held replacement");
                return Ok(());
            }
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }

        let holder = self
            .api
            .list_pods(namespace)
            .await?
            .into_iter()
            .find(|p| p.metadata.name.as_deref() == Some(name));
        if let Some(holder) = holder {
            if holder.metadata.deletion_timestamp.is_none() {
                warn!(
                    namespace,
                    pod = name,
                    "Name taken by a live pod, dropping held replacement"
                );
                self.release(namespace, name).await;
                return Ok(());
            }
        }

        debug!(namespace, pod = name, "Old generation still terminating");
        let wait = self.deletion_timeout(replacement);
        self.await_deletion(&mut events, namespace, name, wait).await?;
        drop(events);

        self.create_replacement(namespace, name, replacement)
            .await
            .map(|_| ())
    }

    async fn create_replacement(
        &self,
        namespace: &str,
        name: &str,
        replacement: &Pod,
    ) -> Result<Pod> {
        let created = match self.api.create_pod(replacement).await {
            Ok(created) => created,
            Err(e) => {
                self.hold(namespace, name, replacement).await;
                return Err(e);
            }
        };
        self.release(namespace, name).await;

        info!(
            namespace,
            pod = name,
            scheduler = created
                .spec
                .as_ref()
                .and_then(|s| s.scheduler_name.as_deref())
                .unwrap_or("<default>"),
            "Recreated pod"
        );
        Ok(created)
    }

    async fn hold(&self, namespace: &str, name: &str, replacement: &Pod) {
        warn!(namespace, pod = name, "Holding replacement until the old pod is gone");
        self.pending
            .lock()
            .await
            .insert((namespace.to_string(), name.to_string()), replacement.clone());
    }

    async fn release(&self, namespace: &str, name: &str) {
        self.pending
            .lock()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Configured timeout on top of the pod's termination grace period
    fn deletion_timeout(&self, pod: &Pod) -> Duration {
        let grace = pod
            .spec
            .as_ref()
            .and_then(|s| s.termination_grace_period_seconds)
            .unwrap_or(0)
            .max(0);
        self.timeout + Duration::from_secs(grace as u64)
    }

    async fn await_deletion(
        &self,
        events: &mut WatchStream<Pod>,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let wait = async {
            while let Some(event) = events.next().await {
                let event = event?;
                if event.is_deleted() && event.object.metadata.name.as_deref() == Some(name) {
                    return Ok(());
                }
            }
            Err(ControllerError::watch_closed(namespace, name))
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ControllerError::watch_timeout(namespace, name, timeout.as_secs()))?
    }
}
