//! Resource generation module.
//!
//! Turns a desired-state ConfigMap into the Kubernetes objects for one
//! cluster role, and names the objects a role owns so they can be deleted
//! without reading the document.
//!
//! ## Resources Generated
//!
//! | Role | Workload | Services |
//! |------|----------|----------|
//! | ZooKeeper | StatefulSet `<name>-zookeeper` | client, headless |
//! | Kafka | StatefulSet `<name>-kafka` | client, headless |
//! | Kafka Connect | Deployment `<name>-connect` | client |

pub mod common;
pub mod diff;
pub mod kafka;
pub mod kafka_connect;
pub mod services;
pub mod zookeeper;

pub use common::{DELETE_CLAIM_ANNOTATION, standard_labels, workload_name};
pub use diff::merge_patch;

use k8s_openapi::api::core::v1::{ConfigMap, Service};

use crate::controller::error::Result;
use crate::gateway::{ClusterObject, ObjectKind};
use crate::model::{ClusterRole, KafkaClusterSpec, KafkaConnectSpec};
use common::{client_service_name, headless_service_name};

/// Build every object of `role` for the cluster declared by `document`.
///
/// The workload comes first, followed by its Services.
pub fn build(
    role: ClusterRole,
    namespace: &str,
    document: &ConfigMap,
) -> Result<Vec<ClusterObject>> {
    let objects = match role {
        ClusterRole::Zookeeper => {
            let spec = KafkaClusterSpec::from_config_map(document)?;
            with_services(
                ClusterObject::StatefulSet(zookeeper::generate_statefulset(
                    document, &spec, namespace,
                )),
                zookeeper::generate_services(document, &spec, namespace),
            )
        }
        ClusterRole::Kafka => {
            let spec = KafkaClusterSpec::from_config_map(document)?;
            with_services(
                ClusterObject::StatefulSet(kafka::generate_statefulset(document, &spec, namespace)),
                kafka::generate_services(document, &spec, namespace),
            )
        }
        ClusterRole::KafkaConnect => {
            let spec = KafkaConnectSpec::from_config_map(document)?;
            with_services(
                ClusterObject::Deployment(kafka_connect::generate_deployment(
                    document, &spec, namespace,
                )),
                kafka_connect::generate_services(document, &spec, namespace),
            )
        }
    };
    Ok(objects)
}

fn with_services(
    workload: ClusterObject,
    services: Vec<Service>,
) -> Vec<ClusterObject> {
    std::iter::once(workload)
        .chain(services.into_iter().map(ClusterObject::Service))
        .collect()
}

/// Kind of the workload object for a role.
pub fn workload_kind(role: ClusterRole) -> ObjectKind {
    match role {
        ClusterRole::Zookeeper | ClusterRole::Kafka => ObjectKind::StatefulSet,
        ClusterRole::KafkaConnect => ObjectKind::Deployment,
    }
}

/// Objects owned by `role` of cluster `name`, workload first.
pub fn object_refs(role: ClusterRole, name: &str) -> Vec<(ObjectKind, String)> {
    let mut refs = vec![
        (workload_kind(role), workload_name(role, name)),
        (ObjectKind::Service, client_service_name(role, name)),
    ];
    if workload_kind(role) == ObjectKind::StatefulSet {
        refs.push((ObjectKind::Service, headless_service_name(role, name)));
    }
    refs
}
