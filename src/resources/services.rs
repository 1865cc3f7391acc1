//! Service generation.
//!
//! Every role gets a client Service; StatefulSet-backed roles also get a
//! headless Service:
//! - **Headless Service**: stable per-pod DNS for ensemble and broker discovery
//! - **Client Service**: load-balanced endpoint for clients

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::model::ClusterRole;
use crate::resources::common::{
    client_service_name, headless_service_name, object_meta, pod_selector_labels, standard_labels,
};

/// A named TCP port exposed by a role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NamedPort {
    pub name: &'static str,
    pub port: i32,
}

impl NamedPort {
    pub const fn new(name: &'static str, port: i32) -> Self {
        Self { name, port }
    }
}

fn service_ports(ports: &[NamedPort]) -> Vec<ServicePort> {
    ports
        .iter()
        .map(|p| ServicePort {
            port: p.port,
            target_port: Some(IntOrString::String(p.name.to_string())),
            name: Some(p.name.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect()
}

/// Generate the headless Service for a StatefulSet-backed role.
///
/// `publishNotReadyAddresses` lets ensemble members resolve each other
/// before they pass readiness.
pub fn generate_headless_service(
    document: &ConfigMap,
    role: ClusterRole,
    namespace: &str,
    cluster: &str,
    ports: &[NamedPort],
) -> Service {
    let name = headless_service_name(role, cluster);
    let mut labels = standard_labels(document, role, &name);
    labels.insert(
        "app.kubernetes.io/service-type".to_string(),
        "headless".to_string(),
    );

    Service {
        metadata: object_meta(name, namespace, labels, BTreeMap::new()),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(pod_selector_labels(role, cluster)),
            ports: Some(service_ports(ports)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the client Service for a role.
pub fn generate_client_service(
    document: &ConfigMap,
    role: ClusterRole,
    namespace: &str,
    cluster: &str,
    ports: &[NamedPort],
) -> Service {
    let name = client_service_name(role, cluster);
    let mut labels = standard_labels(document, role, &name);
    labels.insert(
        "app.kubernetes.io/service-type".to_string(),
        "client".to_string(),
    );

    Service {
        metadata: object_meta(name, namespace, labels, BTreeMap::new()),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(pod_selector_labels(role, cluster)),
            ports: Some(service_ports(ports)),
            ..Default::default()
        }),
        ..Default::default()
    }
}
