use crate::classify::{PodClassifier, PodDisposition};
use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::quota::QuotaGate;
use crate::recreate::{parked_replacement, restored_replacement, PodRecreator};
use crate::traits::ClusterApi;
use arrears_core::{DebtStatus, Resource};
use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parking passes a suspend makes before giving up on pods that keep appearing
const MAX_PARK_PASSES: usize = 3;

/// Which branch a namespace reconciliation took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The namespace no longer exists
    NamespaceMissing,
    /// The namespace carries no debt status marker
    NoStatus,
    /// Status is `Normal`, nothing to do
    AlreadyNormal,
    /// The suspend pipeline ran to completion
    Suspended,
    /// The resume pipeline ran to completion and `Normal` was written back
    Resumed,
    /// An unrecognized marker was overwritten with `Normal`
    Normalized { previous: String },
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::NamespaceMissing => write!(f, "namespace missing"),
            ReconcileOutcome::NoStatus => write!(f, "no debt status"),
            ReconcileOutcome::AlreadyNormal => write!(f, "already normal"),
            ReconcileOutcome::Suspended => write!(f, "suspended"),
            ReconcileOutcome::Resumed => write!(f, "resumed"),
            ReconcileOutcome::Normalized { previous } => {
                write!(f, "normalized unrecognized status '{}'", previous)
            }
        }
    }
}

/// Drives a namespace between running and suspended according to its debt
/// status
///
/// Suspending parks every unowned pod under the reserved scheduler, installs
/// the zero quota and deletes every owned pod. Resuming lifts the quota,
/// hands parked pods back to their previous scheduler (or deletes them when
/// an owner will recreate them) and acknowledges with `Normal`.
///
/// Each stage lists the pods it works on afresh and every mutation tolerates
/// the target state already being reached, so a pipeline that failed halfway
/// can simply be run again.
pub struct NamespaceController {
    api: Arc<dyn ClusterApi>,
    config: ControllerConfig,
    gate: QuotaGate,
    classifier: PodClassifier,
    recreator: PodRecreator,
}

impl NamespaceController {
    pub fn new(api: Arc<dyn ClusterApi>, config: ControllerConfig) -> Self {
        Self {
            gate: QuotaGate::new(api.clone(), config.quota_name.clone()),
            classifier: PodClassifier::new(api.clone(), config.scheduler_name.clone()),
            recreator: PodRecreator::new(api.clone(), config.recreate_timeout()),
            api,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Read the namespace's debt status and run the matching pipeline
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome> {
        let namespace = match self.api.get_namespace(name).await {
            Ok(ns) => ns,
            Err(e) if e.is_not_found() => {
                debug!(namespace = name, "Namespace gone, nothing to reconcile");
                return Ok(ReconcileOutcome::NamespaceMissing);
            }
            Err(e) => return Err(e),
        };

        let Some(status) = DebtStatus::of(&namespace) else {
            warn!(namespace = name, "No debt status on namespace");
            return Ok(ReconcileOutcome::NoStatus);
        };

        match status {
            DebtStatus::Normal => Ok(ReconcileOutcome::AlreadyNormal),
            DebtStatus::SuspendRequested => {
                self.suspend(name).await?;
                Ok(ReconcileOutcome::Suspended)
            }
            DebtStatus::ResumeRequested => {
                self.resume(name).await?;
                Ok(ReconcileOutcome::Resumed)
            }
            DebtStatus::Unrecognized(previous) => {
                warn!(
                    namespace = name,
                    status = %previous,
                    "Unrecognized debt status, resetting to Normal"
                );
                self.write_status(name, &DebtStatus::Normal).await?;
                Ok(ReconcileOutcome::Normalized { previous })
            }
        }
    }

    /// Suspend pipeline: park unowned pods, block admission, delete owned pods
    ///
    /// Unowned pods that show up after parking (created before the quota
    /// landed, or by a re-run on an already blocked namespace) are parked in
    /// a further pass before any owned pod is deleted.
    pub async fn suspend(&self, namespace: &str) -> Result<()> {
        info!(namespace, "Suspending namespace");

        let mut passes = 0;
        let pods = loop {
            self.park_unmanaged(namespace).await?;
            self.gate.block(namespace).await?;

            let pods = self.classifier.classify(namespace).await?;
            if pods.unmanaged.is_empty() {
                break pods;
            }

            passes += 1;
            if passes == MAX_PARK_PASSES {
                return Err(ControllerError::pods_not_parked(
                    namespace,
                    pods.unmanaged.len(),
                ));
            }
            warn!(
                namespace,
                unmanaged = pods.unmanaged.len(),
                "Unmanaged pods appeared while blocking, parking again"
            );
        };

        for pod in &pods.managed {
            self.delete_pod(pod).await?;
        }

        info!(
            namespace,
            parked = pods.parked.len(),
            deleted = pods.managed.len(),
            "Namespace suspended"
        );
        Ok(())
    }

    /// Create held replacements, then park every unowned pod. The zero quota
    /// is lifted while anything is created so the replacements are admitted.
    async fn park_unmanaged(&self, namespace: &str) -> Result<()> {
        if self.recreator.has_pending(namespace).await {
            self.gate.unblock(namespace).await?;
            self.recreator.complete_pending(namespace).await?;
        }

        let pods = self.classifier.classify(namespace).await?;
        if pods.unmanaged.is_empty() {
            return Ok(());
        }

        self.gate.unblock(namespace).await?;
        for pod in &pods.unmanaged {
            let replacement = parked_replacement(pod, &self.config.scheduler_name);
            self.recreator.recreate(pod, &replacement).await?;
        }
        Ok(())
    }

    /// Resume pipeline: unblock admission, release parked pods, write `Normal`
    pub async fn resume(&self, namespace: &str) -> Result<()> {
        info!(namespace, "Resuming namespace");

        self.gate.unblock(namespace).await?;
        self.recreator.complete_pending(namespace).await?;

        let pods = self.classifier.classify(namespace).await?;
        for pod in &pods.parked {
            match PodDisposition::of(pod) {
                PodDisposition::DeleteAndDelegate => self.delete_pod(pod).await?,
                PodDisposition::RecreateInPlace => {
                    self.recreator
                        .recreate(pod, &restored_replacement(pod))
                        .await?;
                }
            }
        }

        self.write_status(namespace, &DebtStatus::Normal).await?;
        info!(namespace, released = pods.parked.len(), "Namespace resumed");
        Ok(())
    }

    /// Delete a pod whose owner will recreate it. Already gone is fine.
    async fn delete_pod(&self, pod: &Pod) -> Result<()> {
        let key = pod.resource_key()?;
        match self.api.delete_pod(&key.namespace, &key.name).await {
            Ok(()) => {
                debug!(namespace = %key.namespace, pod = %key.name, "Deleted owned pod");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn write_status(&self, name: &str, status: &DebtStatus) -> Result<()> {
        let mut namespace = match self.api.get_namespace(name).await {
            Ok(ns) => ns,
            Err(e) if e.is_not_found() => {
                debug!(namespace = name, "Namespace gone, status not written");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        status.apply_to(&mut namespace);
        self.api.update_namespace(&namespace).await?;
        info!(namespace = name, status = %status, "Wrote debt status");
        Ok(())
    }
}
