use crate::error::Result;
use crate::traits::ClusterApi;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::debug;

/// How the controller takes a pod out of (or back into) service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodDisposition {
    /// No owning controller: this controller recreates the pod itself
    RecreateInPlace,
    /// Owned by a higher-level controller, which recreates it after deletion
    DeleteAndDelegate,
}

impl PodDisposition {
    pub fn of(pod: &Pod) -> Self {
        let owned = pod
            .metadata
            .owner_references
            .as_ref()
            .is_some_and(|refs| !refs.is_empty());

        if owned {
            PodDisposition::DeleteAndDelegate
        } else {
            PodDisposition::RecreateInPlace
        }
    }
}

/// True if the pod carries the reserved scheduler name, i.e. was parked by us
pub fn is_parked(pod: &Pod, scheduler_name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.scheduler_name.as_deref())
        == Some(scheduler_name)
}

/// Partition of a namespace's pods. Every pod lands in exactly one bucket,
/// in list order.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Running pods without an owner
    pub unmanaged: Vec<Pod>,
    /// Running pods with an owner
    pub managed: Vec<Pod>,
    /// Pods already parked under the reserved scheduler, owned or not
    pub parked: Vec<Pod>,
}

impl Classification {
    pub fn partition(pods: Vec<Pod>, scheduler_name: &str) -> Self {
        let mut classification = Self::default();

        for pod in pods {
            if is_parked(&pod, scheduler_name) {
                classification.parked.push(pod);
                continue;
            }
            match PodDisposition::of(&pod) {
                PodDisposition::RecreateInPlace => classification.unmanaged.push(pod),
                PodDisposition::DeleteAndDelegate => classification.managed.push(pod),
            }
        }

        classification
    }

    pub fn len(&self) -> usize {
        self.unmanaged.len() + self.managed.len() + self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lists and partitions the pods of a namespace
pub struct PodClassifier {
    api: Arc<dyn ClusterApi>,
    scheduler_name: String,
}

impl PodClassifier {
    pub fn new(api: Arc<dyn ClusterApi>, scheduler_name: impl Into<String>) -> Self {
        Self {
            api,
            scheduler_name: scheduler_name.into(),
        }
    }

    /// Classify the namespace's current pods. A list failure is returned
    /// as-is; nothing is classified from a partial list.
    pub async fn classify(&self, namespace: &str) -> Result<Classification> {
        let pods = self.api.list_pods(namespace).await?;
        let classification = Classification::partition(pods, &self.scheduler_name);

        debug!(
            namespace,
            unmanaged = classification.unmanaged.len(),
            managed = classification.managed.len(),
            parked = classification.parked.len(),
            "Classified pods"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;
    use crate::mock::{MockCluster, MockOp};
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use std::collections::HashSet;

    const PARKED: &str = "arrears-debt-scheduler";

    fn make_pod(name: &str, owned: bool, scheduler: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("tenant-a".to_string());
        if owned {
            pod.metadata.owner_references = Some(vec![OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: "ReplicaSet".to_string(),
                name: "web-5d4f".to_string(),
                uid: "rs-uid".to_string(),
                controller: Some(true),
                ..Default::default()
            }]);
        }
        pod.spec = Some(PodSpec {
            scheduler_name: scheduler.map(str::to_string),
            ..Default::default()
        });
        pod
    }

    fn names(pods: &[Pod]) -> Vec<&str> {
        pods.iter()
            .filter_map(|p| p.metadata.name.as_deref())
            .collect()
    }

    #[test]
    fn test_disposition_follows_owner_references() {
        assert_eq!(
            PodDisposition::of(&make_pod("a", false, None)),
            PodDisposition::RecreateInPlace
        );
        assert_eq!(
            PodDisposition::of(&make_pod("b", true, None)),
            PodDisposition::DeleteAndDelegate
        );

        let mut empty_refs = make_pod("c", false, None);
        empty_refs.metadata.owner_references = Some(vec![]);
        assert_eq!(
            PodDisposition::of(&empty_refs),
            PodDisposition::RecreateInPlace
        );
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let pods = vec![
            make_pod("orphan", false, Some("default-scheduler")),
            make_pod("replica", true, None),
            make_pod("parked-orphan", false, Some(PARKED)),
            make_pod("parked-replica", true, Some(PARKED)),
            make_pod("custom", false, Some("volcano")),
        ];
        let input: HashSet<String> = pods
            .iter()
            .filter_map(|p| p.metadata.name.clone())
            .collect();

        let classification = Classification::partition(pods, PARKED);

        assert_eq!(names(&classification.unmanaged), vec!["orphan", "custom"]);
        assert_eq!(names(&classification.managed), vec!["replica"]);
        assert_eq!(
            names(&classification.parked),
            vec!["parked-orphan", "parked-replica"]
        );

        let mut seen = HashSet::new();
        for pod in classification
            .unmanaged
            .iter()
            .chain(&classification.managed)
            .chain(&classification.parked)
        {
            assert!(seen.insert(pod.metadata.name.clone().unwrap()));
        }
        assert_eq!(seen, input);
        assert_eq!(classification.len(), 5);
    }

    #[test]
    fn test_pod_without_spec_is_not_parked() {
        let mut pod = make_pod("bare", false, None);
        pod.spec = None;
        assert!(!is_parked(&pod, PARKED));
    }

    #[tokio::test]
    async fn test_classify_lists_namespace() {
        let cluster = Arc::new(MockCluster::new());
        cluster
            .insert_pod(make_pod("orphan", false, None))
            .await
            .unwrap();
        cluster
            .insert_pod(make_pod("replica", true, None))
            .await
            .unwrap();

        let classifier = PodClassifier::new(cluster.clone(), PARKED);
        let classification = classifier.classify("tenant-a").await.unwrap();

        assert_eq!(names(&classification.unmanaged), vec!["orphan"]);
        assert_eq!(names(&classification.managed), vec!["replica"]);
        assert!(classification.parked.is_empty());

        assert!(classifier.classify("tenant-b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_aborts() {
        let cluster = Arc::new(MockCluster::new());
        cluster.fail_next(MockOp::ListPods).await;

        let classifier = PodClassifier::new(cluster.clone(), PARKED);
        let err = classifier.classify("tenant-a").await.unwrap_err();
        assert!(matches!(err, ControllerError::ApiError { .. }));
    }
}
