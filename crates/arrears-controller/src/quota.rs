use crate::error::Result;
use crate::traits::ClusterApi;
use k8s_openapi::api::core::v1::{ResourceQuota, ResourceQuotaSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Hard limits pinned to zero while a namespace is suspended
const BLOCKED_RESOURCES: [&str; 3] = ["limits.cpu", "limits.memory", "requests.storage"];

/// Build the zero-limit quota for a namespace
pub fn zero_quota(namespace: &str, name: &str) -> ResourceQuota {
    let hard = BLOCKED_RESOURCES
        .iter()
        .map(|r| (r.to_string(), Quantity("0".to_string())))
        .collect::<BTreeMap<_, _>>();

    let mut quota = ResourceQuota::default();
    quota.metadata.name = Some(name.to_string());
    quota.metadata.namespace = Some(namespace.to_string());
    quota.spec = Some(ResourceQuotaSpec {
        hard: Some(hard),
        ..Default::default()
    });
    quota
}

/// Installs and removes the zero-limit ResourceQuota that blocks admission of
/// new workloads in a suspended namespace
///
/// Both directions are idempotent: blocking an already blocked namespace and
/// unblocking an unblocked one succeed without touching anything.
pub struct QuotaGate {
    api: Arc<dyn ClusterApi>,
    quota_name: String,
}

impl QuotaGate {
    pub fn new(api: Arc<dyn ClusterApi>, quota_name: impl Into<String>) -> Self {
        Self {
            api,
            quota_name: quota_name.into(),
        }
    }

    /// Ensure the zero quota exists in `namespace`
    pub async fn block(&self, namespace: &str) -> Result<()> {
        let quota = zero_quota(namespace, &self.quota_name);

        match self.api.create_resource_quota(&quota).await {
            Ok(_) => {
                info!(namespace, quota = %self.quota_name, "Installed zero resource quota");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(namespace, quota = %self.quota_name, "Zero resource quota already present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Ensure the zero quota is absent from `namespace`
    pub async fn unblock(&self, namespace: &str) -> Result<()> {
        match self
            .api
            .delete_resource_quota(namespace, &self.quota_name)
            .await
        {
            Ok(()) => {
                info!(namespace, quota = %self.quota_name, "Removed zero resource quota");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(namespace, quota = %self.quota_name, "Zero resource quota already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the zero quota is currently installed
    pub async fn is_blocked(&self, namespace: &str) -> Result<bool> {
        match self
            .api
            .get_resource_quota(namespace, &self.quota_name)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
