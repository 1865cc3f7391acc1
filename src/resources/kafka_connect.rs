//! Kafka Connect generation.
//!
//! Connect workers are stateless, so they run as a Deployment behind a
//! single client Service exposing the REST API.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Container, PodSpec, PodTemplateSpec, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

use crate::model::{ClusterRole, KafkaConnectSpec};
use crate::resources::common::{
    container_port, container_security_context, env_var, http_probe, object_meta,
    pod_selector_labels, standard_labels, workload_name,
};
use crate::resources::services::{NamedPort, generate_client_service};

pub const REST_PORT: NamedPort = NamedPort::new("rest-api", 8083);

/// Render `KAFKA_CONNECT_*` environment into a worker properties file
/// (`KAFKA_CONNECT_GROUP_ID` becomes `group.id`) and start the worker.
const START_SCRIPT: &str = r#"env | grep '^KAFKA_CONNECT_' | sed -e 's/^KAFKA_CONNECT_//' | while IFS='=' read -r key value; do echo "$(echo "$key" | tr 'A-Z_' 'a-z.')=$value"; done > /tmp/connect-distributed.properties && exec /opt/kafka/bin/connect-distributed.sh /tmp/connect-distributed.properties"#;

/// Generate the Kafka Connect Deployment.
pub fn generate_deployment(
    document: &ConfigMap,
    spec: &KafkaConnectSpec,
    namespace: &str,
) -> Deployment {
    let role = ClusterRole::KafkaConnect;
    let name = workload_name(role, &spec.name);
    let labels = standard_labels(document, role, &name);

    let mut env: Vec<_> = spec
        .worker_config
        .iter()
        .map(|(key, value)| env_var(key, value.clone()))
        .collect();
    env.push(env_var(
        "KAFKA_CONNECT_REST_PORT",
        REST_PORT.port.to_string(),
    ));

    let container = Container {
        name: "kafka-connect".to_string(),
        image: Some(spec.image.clone()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            START_SCRIPT.to_string(),
        ]),
        ports: Some(vec![container_port(REST_PORT.name, REST_PORT.port)]),
        env: Some(env),
        liveness_probe: Some(http_probe("/", REST_PORT.name, &spec.health_check)),
        readiness_probe: Some(http_probe("/", REST_PORT.name, &spec.health_check)),
        security_context: Some(container_security_context()),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(name, namespace, labels.clone(), BTreeMap::new()),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(role, &spec.name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the Kafka Connect REST Service.
pub fn generate_services(
    document: &ConfigMap,
    spec: &KafkaConnectSpec,
    namespace: &str,
) -> Vec<Service> {
    vec![generate_client_service(
        document,
        ClusterRole::KafkaConnect,
        namespace,
        &spec.name,
        &[REST_PORT],
    )]
}
