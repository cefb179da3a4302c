use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// CPU and memory amounts, used for quota admission checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    /// CPU in millicores (1000 = 1 core)
    pub cpu_millicores: i64,
    /// Memory in bytes
    pub memory_bytes: i64,
}

impl ResourceQuantities {
    /// Parse CPU string (e.g., "2", "1000m", "0.5")
    pub fn parse_cpu(s: &str) -> Result<i64, String> {
        if let Some(m) = s.strip_suffix('m') {
            // Millicores
            m.parse::<i64>()
                .map_err(|e| format!("Invalid CPU millicore value: {}", e))
        } else if let Ok(cores) = s.parse::<f64>() {
            // Cores as float
            Ok((cores * 1000.0) as i64)
        } else {
            Err(format!("Invalid CPU format: {}", s))
        }
    }

    /// Parse memory string (e.g., "128Mi", "1Gi", "1024")
    pub fn parse_memory(s: &str) -> Result<i64, String> {
        if let Some(num) = s.strip_suffix("Ki") {
            Ok(num.parse::<i64>().map_err(|e| e.to_string())? * 1024)
        } else if let Some(num) = s.strip_suffix("Mi") {
            Ok(num.parse::<i64>().map_err(|e| e.to_string())? * 1024 * 1024)
        } else if let Some(num) = s.strip_suffix("Gi") {
            Ok(num.parse::<i64>().map_err(|e| e.to_string())? * 1024 * 1024 * 1024)
        } else {
            // Plain bytes
            s.parse::<i64>().map_err(|e| e.to_string())
        }
    }

    /// Get CPU and memory from a resource map (k8s-openapi format)
    pub fn from_k8s_resource_map(resources: &BTreeMap<String, Quantity>) -> Self {
        let cpu_millicores = resources
            .get("cpu")
            .and_then(|q| Self::parse_cpu(&q.0).ok())
            .unwrap_or(0);

        let memory_bytes = resources
            .get("memory")
            .and_then(|q| Self::parse_memory(&q.0).ok())
            .unwrap_or(0);

        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    /// Sum of the resource limits declared by all containers of a pod
    pub fn pod_limits(pod: &Pod) -> Self {
        let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or(&[]);

        containers
            .iter()
            .filter_map(|c| c.resources.as_ref().and_then(|r| r.limits.as_ref()))
            .map(Self::from_k8s_resource_map)
            .fold(Self::default(), |acc, q| Self {
                cpu_millicores: acc.cpu_millicores + q.cpu_millicores,
                memory_bytes: acc.memory_bytes + q.memory_bytes,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};

    fn container_with_limits(cpu: &str, memory: &str) -> Container {
        Container {
            name: "app".to_string(),
            resources: Some(ResourceRequirements {
                limits: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(cpu.to_string())),
                    ("memory".to_string(), Quantity(memory.to_string())),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_cpu() {
        assert_eq!(ResourceQuantities::parse_cpu("1").unwrap(), 1000);
        assert_eq!(ResourceQuantities::parse_cpu("0.5").unwrap(), 500);
        assert_eq!(ResourceQuantities::parse_cpu("100m").unwrap(), 100);
        assert_eq!(ResourceQuantities::parse_cpu("0").unwrap(), 0);
        assert!(ResourceQuantities::parse_cpu("lots").is_err());
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(ResourceQuantities::parse_memory("1024").unwrap(), 1024);
        assert_eq!(ResourceQuantities::parse_memory("1Ki").unwrap(), 1024);
        assert_eq!(
            ResourceQuantities::parse_memory("128Mi").unwrap(),
            128 * 1024 * 1024
        );
        assert_eq!(
            ResourceQuantities::parse_memory("1Gi").unwrap(),
            1024 * 1024 * 1024
        );
    }

    #[test]
    fn test_pod_limits_sums_containers() {
        let mut pod = Pod::default();
        pod.spec = Some(PodSpec {
            containers: vec![
                container_with_limits("500m", "128Mi"),
                container_with_limits("1", "1Gi"),
                Container::default(),
            ],
            ..Default::default()
        });

        let limits = ResourceQuantities::pod_limits(&pod);
        assert_eq!(limits.cpu_millicores, 1500);
        assert_eq!(limits.memory_bytes, 128 * 1024 * 1024 + 1024 * 1024 * 1024);
    }

    #[test]
    fn test_pod_without_spec_has_zero_limits() {
        assert_eq!(
            ResourceQuantities::pod_limits(&Pod::default()),
            ResourceQuantities::default()
        );
    }
}
