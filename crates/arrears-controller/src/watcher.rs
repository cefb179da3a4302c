use crate::controller::NamespaceController;
use crate::error::Result;
use crate::traits::ClusterApi;
use arrears_core::{WatchEvent, WatchEventType, DEBT_STATUS_ANNOTATION};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Remembers the last debt status seen per namespace so that events which
/// leave it unchanged do not trigger a reconciliation
#[derive(Debug, Default)]
pub struct StatusTracker {
    seen: HashMap<String, String>,
}

impl StatusTracker {
    /// Record a namespace event. Returns the namespace name when its status
    /// needs reconciling.
    pub fn observe(&mut self, event: &WatchEvent<Namespace>) -> Option<String> {
        let name = event.object.metadata.name.clone()?;
        let status = event
            .object
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(DEBT_STATUS_ANNOTATION))
            .cloned();

        match event.event_type {
            WatchEventType::Added | WatchEventType::Modified => {
                let Some(status) = status else {
                    self.seen.remove(&name);
                    return None;
                };
                let previous = self.seen.insert(name.clone(), status.clone());
                if event.event_type == WatchEventType::Modified
                    && previous.unwrap_or_default() == status
                {
                    return None;
                }
                Some(name)
            }
            WatchEventType::Deleted => {
                self.seen.remove(&name);
                None
            }
            WatchEventType::Error => None,
        }
    }
}

/// Watches namespaces and reconciles each one whose debt status changes
///
/// Failed reconciliations are retried every `retry_interval` until one
/// succeeds, the status changes again or the namespace is deleted.
pub struct DebtStatusWatcher {
    api: Arc<dyn ClusterApi>,
    controller: Arc<NamespaceController>,
}

impl DebtStatusWatcher {
    pub fn new(api: Arc<dyn ClusterApi>, controller: Arc<NamespaceController>) -> Self {
        Self { api, controller }
    }

    /// Run until `token` is cancelled. A watch that ends or fails is re-opened.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let retry_interval = self.controller.config().retry_interval();
        info!(
            "Starting debt status watcher (retry interval: {:?})",
            retry_interval
        );

        let mut tracker = StatusTracker::default();
        let mut retries: HashMap<String, Instant> = HashMap::new();

        loop {
            let mut events = tokio::select! {
                _ = token.cancelled() => {
                    info!("Debt status watcher shutting down");
                    return Ok(());
                }
                watch = self.api.watch_namespaces() => match watch {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("Failed to watch namespaces: {}", e);
                        tokio::select! {
                            _ = token.cancelled() => return Ok(()),
                            _ = sleep(retry_interval) => continue,
                        }
                    }
                },
            };
            debug!("Watching namespaces");

            loop {
                let next_retry = retries.values().min().copied();

                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Debt status watcher shutting down");
                        return Ok(());
                    }
                    event = events.next() => match event {
                        Some(Ok(event)) => {
                            if event.is_deleted() {
                                if let Some(name) = event.object.metadata.name.as_deref() {
                                    retries.remove(name);
                                }
                            }
                            if let Some(name) = tracker.observe(&event) {
                                self.reconcile(&name, &mut retries).await;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Namespace watch failed, re-opening: {}", e);
                            break;
                        }
                        None => {
                            warn!("Namespace watch closed, re-opening");
                            break;
                        }
                    },
                    _ = sleep_until(next_retry.unwrap_or_else(Instant::now)), if next_retry.is_some() => {
                        let now = Instant::now();
                        let due: Vec<String> = retries
                            .iter()
                            .filter(|(_, at)| **at <= now)
                            .map(|(name, _)| name.clone())
                            .collect();
                        for name in due {
                            self.reconcile(&name, &mut retries).await;
                        }
                    }
                }
            }
        }
    }

    async fn reconcile(&self, name: &str, retries: &mut HashMap<String, Instant>) {
        match self.controller.reconcile(name).await {
            Ok(outcome) => {
                retries.remove(name);
                info!(namespace = name, %outcome, "Reconciled namespace");
            }
            Err(e) => {
                let retry_interval = self.controller.config().retry_interval();
                error!(
                    namespace = name,
                    "Reconcile failed, retrying in {:?}: {}", retry_interval, e
                );
                retries.insert(name.to_string(), Instant::now() + retry_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::mock::{MockCluster, MockOp};
    use arrears_core::DebtStatus;
    use futures_util::future::{BoxFuture, FutureExt};
    use k8s_openapi::api::core::v1::{Pod, PodSpec};
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::time::Duration;

    const NS: &str = "tenant-a";

    fn make_namespace(status: Option<&str>) -> Namespace {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(NS.to_string());
        ns.metadata.annotations = status.map(|s| {
            BTreeMap::from([(DEBT_STATUS_ANNOTATION.to_string(), s.to_string())])
        });
        ns
    }

    fn event(event_type: WatchEventType, status: Option<&str>) -> WatchEvent<Namespace> {
        WatchEvent {
            event_type,
            object: make_namespace(status),
        }
    }

    async fn wait_for<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached");
    }

    fn start(
        cluster: &Arc<MockCluster>,
    ) -> (CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let controller = Arc::new(NamespaceController::new(
            cluster.clone(),
            ControllerConfig::default(),
        ));
        let watcher = DebtStatusWatcher::new(cluster.clone(), controller);
        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let token = token.clone();
            async move { watcher.run(token).await }
        });
        (token, handle)
    }

    fn quota_present(cluster: &Arc<MockCluster>) -> impl FnMut() -> BoxFuture<'static, bool> {
        let cluster = cluster.clone();
        move || {
            let cluster = cluster.clone();
            async move { cluster.get_resource_quota(NS, "debt-limit0").await.is_ok() }.boxed()
        }
    }

    #[test]
    fn test_added_with_status_reconciles() {
        let mut tracker = StatusTracker::default();
        assert_eq!(
            tracker.observe(&event(WatchEventType::Added, Some("Suspend"))),
            Some(NS.to_string())
        );
        assert_eq!(tracker.observe(&event(WatchEventType::Added, None)), None);
    }

    #[test]
    fn test_modified_reconciles_only_on_change() {
        let mut tracker = StatusTracker::default();
        tracker.observe(&event(WatchEventType::Added, Some("Normal")));

        assert_eq!(
            tracker.observe(&event(WatchEventType::Modified, Some("Normal"))),
            None
        );
        assert_eq!(
            tracker.observe(&event(WatchEventType::Modified, Some("Suspend"))),
            Some(NS.to_string())
        );
        assert_eq!(
            tracker.observe(&event(WatchEventType::Modified, Some("Suspend"))),
            None
        );
        assert_eq!(
            tracker.observe(&event(WatchEventType::Modified, None)),
            None
        );
    }

    #[test]
    fn test_unseen_namespace_compares_against_empty() {
        let mut tracker = StatusTracker::default();
        assert_eq!(
            tracker.observe(&event(WatchEventType::Modified, Some("Suspend"))),
            Some(NS.to_string())
        );
        assert_eq!(
            tracker.observe(&event(WatchEventType::Modified, Some(""))),
            Some(NS.to_string())
        );
    }

    #[test]
    fn test_deleted_namespace_is_forgotten() {
        let mut tracker = StatusTracker::default();
        tracker.observe(&event(WatchEventType::Added, Some("Suspend")));
        assert_eq!(
            tracker.observe(&event(WatchEventType::Deleted, Some("Suspend"))),
            None
        );
        assert_eq!(
            tracker.observe(&event(WatchEventType::Modified, Some("Suspend"))),
            Some(NS.to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_changes_drive_pipelines() {
        let cluster = Arc::new(MockCluster::new());
        let mut pod = Pod::default();
        pod.metadata.name = Some("web".to_string());
        pod.metadata.namespace = Some(NS.to_string());
        pod.spec = Some(PodSpec::default());
        cluster.insert_pod(pod).await.unwrap();

        let (token, handle) = start(&cluster);
        sleep(Duration::from_millis(10)).await;

        cluster
            .insert_namespace(make_namespace(Some("Suspend")))
            .await
            .unwrap();
        wait_for(quota_present(&cluster)).await;

        let mut ns = cluster.get_namespace(NS).await.unwrap();
        DebtStatus::ResumeRequested.apply_to(&mut ns);
        cluster.update_namespace(&ns).await.unwrap();

        let watched = cluster.clone();
        wait_for(move || {
            let cluster = watched.clone();
            async move {
                let ns = cluster.get_namespace(NS).await.unwrap();
                DebtStatus::of(&ns) == Some(DebtStatus::Normal)
            }
        })
        .await;
        assert!(cluster
            .get_resource_quota(NS, "debt-limit0")
            .await
            .is_err());

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconcile_is_retried() {
        let cluster = Arc::new(MockCluster::new());
        cluster.fail_next(MockOp::CreateResourceQuota).await;

        let (token, handle) = start(&cluster);
        sleep(Duration::from_millis(10)).await;

        let started = Instant::now();
        cluster
            .insert_namespace(make_namespace(Some("Suspend")))
            .await
            .unwrap();
        wait_for(quota_present(&cluster)).await;
        assert!(started.elapsed() >= Duration::from_secs(5));

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_watch_is_reopened() {
        let cluster = Arc::new(MockCluster::new());

        let (token, handle) = start(&cluster);
        sleep(Duration::from_millis(10)).await;

        cluster.close_watches().await;
        sleep(Duration::from_millis(10)).await;

        cluster
            .insert_namespace(make_namespace(Some("Suspend")))
            .await
            .unwrap();
        wait_for(quota_present(&cluster)).await;

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_watch_is_retried() {
        let cluster = Arc::new(MockCluster::new());
        cluster.fail_next(MockOp::WatchNamespaces).await;

        let (token, handle) = start(&cluster);
        // first attempt fails, second after the retry interval
        sleep(Duration::from_secs(6)).await;

        cluster
            .insert_namespace(make_namespace(Some("Suspend")))
            .await
            .unwrap();
        wait_for(quota_present(&cluster)).await;

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
