//! ZooKeeper ensemble generation.
//!
//! A StatefulSet plus client and headless Services. Server ids come from
//! the pod ordinal, so the ensemble membership string is derived from the
//! replica count and the headless Service's per-pod DNS names.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PodSpec, PodTemplateSpec, Service, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::model::{ClusterRole, KafkaClusterSpec};
use crate::resources::common::{
    DATA_VOLUME, container_port, container_security_context, data_volumes, env_var,
    headless_service_name, object_meta, pod_selector_labels, standard_labels, storage_annotations,
    tcp_probe, volume_claim_templates, workload_name,
};
use crate::resources::services::{NamedPort, generate_client_service, generate_headless_service};

pub const CLIENT_PORT: NamedPort = NamedPort::new("client", 2181);
pub const PEER_PORT: NamedPort = NamedPort::new("peer", 2888);
pub const ELECTION_PORT: NamedPort = NamedPort::new("election", 3888);

const DATA_DIR: &str = "/data";

/// Derive `ZOO_MY_ID` from the pod ordinal before handing over to the
/// image's entrypoint.
const START_SCRIPT: &str = r#"export ZOO_MY_ID=$(( ${HOSTNAME##*-} + 1 )) && exec /docker-entrypoint.sh zkServer.sh start-foreground"#;

/// Ensemble membership in the image's `ZOO_SERVERS` format.
pub fn zoo_servers(cluster: &str, namespace: &str, replicas: i32) -> String {
    let statefulset = workload_name(ClusterRole::Zookeeper, cluster);
    let headless = headless_service_name(ClusterRole::Zookeeper, cluster);
    (0..replicas)
        .map(|ordinal| {
            format!(
                "server.{}={}-{}.{}.{}.svc:{}:{};{}",
                ordinal + 1,
                statefulset,
                ordinal,
                headless,
                namespace,
                PEER_PORT.port,
                ELECTION_PORT.port,
                CLIENT_PORT.port
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generate the ZooKeeper StatefulSet.
pub fn generate_statefulset(
    document: &ConfigMap,
    spec: &KafkaClusterSpec,
    namespace: &str,
) -> StatefulSet {
    let role = ClusterRole::Zookeeper;
    let zookeeper = &spec.zookeeper;
    let name = workload_name(role, &spec.name);
    let labels = standard_labels(document, role, &name);

    let container = Container {
        name: "zookeeper".to_string(),
        image: Some(zookeeper.image.clone()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            START_SCRIPT.to_string(),
        ]),
        ports: Some(
            [CLIENT_PORT, PEER_PORT, ELECTION_PORT]
                .iter()
                .map(|p| container_port(p.name, p.port))
                .collect(),
        ),
        env: Some(vec![
            env_var(
                "ZOO_SERVERS",
                zoo_servers(&spec.name, namespace, zookeeper.replicas),
            ),
            env_var("ZOO_DATA_DIR", DATA_DIR),
            env_var("ZOO_STANDALONE_ENABLED", (zookeeper.replicas == 1).to_string()),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..Default::default()
        }]),
        liveness_probe: Some(tcp_probe(CLIENT_PORT.name, &zookeeper.health_check)),
        readiness_probe: Some(tcp_probe(CLIENT_PORT.name, &zookeeper.health_check)),
        security_context: Some(container_security_context()),
        ..Default::default()
    };

    StatefulSet {
        metadata: object_meta(
            name,
            namespace,
            labels.clone(),
            storage_annotations(&zookeeper.storage),
        ),
        spec: Some(StatefulSetSpec {
            replicas: Some(zookeeper.replicas),
            service_name: Some(headless_service_name(role, &spec.name)),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(role, &spec.name)),
                ..Default::default()
            },
            pod_management_policy: Some("Parallel".to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: data_volumes(&zookeeper.storage),
                    ..Default::default()
                }),
            },
            volume_claim_templates: volume_claim_templates(&zookeeper.storage, &labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the ZooKeeper client and headless Services.
pub fn generate_services(
    document: &ConfigMap,
    spec: &KafkaClusterSpec,
    namespace: &str,
) -> Vec<Service> {
    let role = ClusterRole::Zookeeper;
    vec![
        generate_client_service(document, role, namespace, &spec.name, &[CLIENT_PORT]),
        generate_headless_service(
            document,
            role,
            namespace,
            &spec.name,
            &[CLIENT_PORT, PEER_PORT, ELECTION_PORT],
        ),
    ]
}
