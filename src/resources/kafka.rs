//! Kafka broker generation.
//!
//! Brokers run as a StatefulSet wired to the paired ZooKeeper ensemble
//! through its client Service. Broker ids and advertised listeners come
//! from the pod ordinal and the headless Service.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PodSpec, PodTemplateSpec, Service, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::model::{ClusterRole, KafkaClusterSpec};
use crate::resources::common::{
    DATA_VOLUME, client_service_name, container_port, container_security_context, data_volumes,
    env_var, headless_service_name, object_meta, pod_selector_labels, standard_labels,
    storage_annotations, tcp_probe, volume_claim_templates, workload_name,
};
use crate::resources::services::{NamedPort, generate_client_service, generate_headless_service};
use crate::resources::zookeeper;

pub const CLIENT_PORT: NamedPort = NamedPort::new("client", 9092);

const DATA_DIR: &str = "/var/lib/kafka/data";

/// Export per-pod broker settings, then run the image's launcher.
const START_SCRIPT: &str = r#"export KAFKA_BROKER_ID=${HOSTNAME##*-} && export KAFKA_ADVERTISED_LISTENERS="PLAINTEXT://${HOSTNAME}.${KAFKA_HEADLESS_SERVICE}:9092" && exec /etc/kafka/docker/run"#;

/// ZooKeeper connect string for the cluster's ensemble.
pub fn zookeeper_connect(cluster: &str) -> String {
    format!(
        "{}:{}",
        client_service_name(ClusterRole::Zookeeper, cluster),
        zookeeper::CLIENT_PORT.port
    )
}

/// Generate the Kafka StatefulSet.
pub fn generate_statefulset(
    document: &ConfigMap,
    spec: &KafkaClusterSpec,
    namespace: &str,
) -> StatefulSet {
    let role = ClusterRole::Kafka;
    let kafka = &spec.kafka;
    let name = workload_name(role, &spec.name);
    let labels = standard_labels(document, role, &name);
    let headless = headless_service_name(role, &spec.name);

    let container = Container {
        name: "kafka".to_string(),
        image: Some(kafka.image.clone()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            START_SCRIPT.to_string(),
        ]),
        ports: Some(vec![container_port(CLIENT_PORT.name, CLIENT_PORT.port)]),
        env: Some(vec![
            env_var("KAFKA_ZOOKEEPER_CONNECT", zookeeper_connect(&spec.name)),
            env_var(
                "KAFKA_HEADLESS_SERVICE",
                format!("{}.{}.svc", headless, namespace),
            ),
            env_var(
                "KAFKA_LISTENERS",
                format!("PLAINTEXT://0.0.0.0:{}", CLIENT_PORT.port),
            ),
            env_var("KAFKA_LOG_DIRS", DATA_DIR),
            env_var(
                "KAFKA_DEFAULT_REPLICATION_FACTOR",
                kafka.default_replication_factor.to_string(),
            ),
            env_var(
                "KAFKA_OFFSETS_TOPIC_REPLICATION_FACTOR",
                kafka.offsets_topic_replication_factor.to_string(),
            ),
            env_var(
                "KAFKA_TRANSACTION_STATE_LOG_REPLICATION_FACTOR",
                kafka.transaction_state_log_replication_factor.to_string(),
            ),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..Default::default()
        }]),
        liveness_probe: Some(tcp_probe(CLIENT_PORT.name, &kafka.health_check)),
        readiness_probe: Some(tcp_probe(CLIENT_PORT.name, &kafka.health_check)),
        security_context: Some(container_security_context()),
        ..Default::default()
    };

    StatefulSet {
        metadata: object_meta(
            name,
            namespace,
            labels.clone(),
            storage_annotations(&kafka.storage),
        ),
        spec: Some(StatefulSetSpec {
            replicas: Some(kafka.replicas),
            service_name: Some(headless),
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
                    volumes: data_volumes(&kafka.storage),
                    ..Default::default()
                }),
            },
            volume_claim_templates: volume_claim_templates(&kafka.storage, &labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the Kafka client and headless Services.
pub fn generate_services(
    document: &ConfigMap,
    spec: &KafkaClusterSpec,
    namespace: &str,
) -> Vec<Service> {
    let role = ClusterRole::Kafka;
    vec![
        generate_client_service(document, role, namespace, &spec.name, &[CLIENT_PORT]),
        generate_headless_service(document, role, namespace, &spec.name, &[CLIENT_PORT]),
    ]
}
