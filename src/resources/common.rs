//! Common resource generation utilities.
//!
//! Naming, labels, probes and storage shared by the ZooKeeper, Kafka and
//! Kafka Connect generators.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMap, ContainerPort, EmptyDirVolumeSource, EnvVar, HTTPGetAction,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, Probe, SecurityContext, TCPSocketAction,
    Volume, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::labels::{CLUSTER_LABEL, MANAGED_BY, MANAGED_BY_LABEL, NAME_LABEL, ROLE_LABEL};
use crate::model::{ClusterRole, HealthCheck, StorageSpec};

/// Annotation recording whether persistent claims go with the cluster.
pub const DELETE_CLAIM_ANNOTATION: &str = "kafka-operator.io/delete-claim";

/// Name of the data volume in every StatefulSet.
pub const DATA_VOLUME: &str = "data";

/// Name of the workload (StatefulSet or Deployment) for a role.
pub fn workload_name(role: ClusterRole, cluster: &str) -> String {
    match role {
        ClusterRole::Zookeeper => format!("{}-zookeeper", cluster),
        ClusterRole::Kafka => format!("{}-kafka", cluster),
        ClusterRole::KafkaConnect => format!("{}-connect", cluster),
    }
}

/// Name of the load-balanced client Service for a role.
pub fn client_service_name(role: ClusterRole, cluster: &str) -> String {
    workload_name(role, cluster)
}

/// Name of the headless Service backing a StatefulSet's pod DNS.
pub fn headless_service_name(role: ClusterRole, cluster: &str) -> String {
    format!("{}-headless", workload_name(role, cluster))
}

/// Labels selecting the pods of one role of one cluster.
pub fn pod_selector_labels(role: ClusterRole, cluster: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(CLUSTER_LABEL.to_string(), cluster.to_string());
    labels.insert(ROLE_LABEL.to_string(), role.to_string());
    labels
}

/// Labels for an object created from `document`.
///
/// Starts from the document's own labels so the object stays inside the
/// owned scope and carries the type label, then adds the back-reference,
/// role and name labels.
pub fn standard_labels(
    document: &ConfigMap,
    role: ClusterRole,
    object_name: &str,
) -> BTreeMap<String, String> {
    let mut labels = document.labels().clone();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        document.name_any(),
    );
    labels.insert("app.kubernetes.io/component".to_string(), role.to_string());
    labels.insert(NAME_LABEL.to_string(), object_name.to_string());
    labels.extend(pod_selector_labels(role, &document.name_any()));
    labels
}

/// Metadata for a generated object.
pub fn object_meta(
    name: String,
    namespace: &str,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
) -> ObjectMeta {
    // No owner reference: teardown order is driven by the delete chain.
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        annotations: if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        },
        ..Default::default()
    }
}

pub fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// TCP socket probe on a named port.
pub fn tcp_probe(port: &str, health_check: &HealthCheck) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::String(port.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(health_check.initial_delay),
        timeout_seconds: Some(health_check.timeout),
        ..Default::default()
    }
}

/// HTTP GET probe on a named port.
pub fn http_probe(path: &str, port: &str, health_check: &HealthCheck) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(port.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(health_check.initial_delay),
        timeout_seconds: Some(health_check.timeout),
        ..Default::default()
    }
}

/// Restricted container security context.
pub fn container_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod volumes for ephemeral storage; `None` when storage is persistent.
pub fn data_volumes(storage: &StorageSpec) -> Option<Vec<Volume>> {
    match storage {
        StorageSpec::Ephemeral => Some(vec![Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]),
        StorageSpec::PersistentClaim { .. } => None,
    }
}

/// Claim templates for persistent storage; `None` when storage is ephemeral.
pub fn volume_claim_templates(
    storage: &StorageSpec,
    labels: &BTreeMap<String, String>,
) -> Option<Vec<PersistentVolumeClaim>> {
    match storage {
        StorageSpec::Ephemeral => None,
        StorageSpec::PersistentClaim { size, class, .. } => Some(vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(DATA_VOLUME.to_string()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: class.clone(),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(size.clone()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
    }
}

/// Annotations recording storage policy on a StatefulSet.
pub fn storage_annotations(storage: &StorageSpec) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if let StorageSpec::PersistentClaim { delete_claim, .. } = storage {
        annotations.insert(
            DELETE_CLAIM_ANNOTATION.to_string(),
            delete_claim.to_string(),
        );
    }
    annotations
}
