//! Live/desired comparison.
//!
//! Produces a JSON merge patch carrying only the fields the controller
//! owns: labels, replica counts, container image, command, env, ports and
//! probe timings, and service ports. Fields the API server defaults on
//! the live object are never compared, so a converged object yields no
//! patch.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec, Probe, ServicePort};
use serde_json::{Map, Value, json};

use crate::gateway::ClusterObject;

/// Merge patch turning `live` into `desired`, or `None` when they agree.
///
/// Both objects must be of the same kind; mismatched kinds yield `None`.
pub fn merge_patch(live: &ClusterObject, desired: &ClusterObject) -> Option<Value> {
    let mut patch = Map::new();

    let desired_labels = desired.labels();
    if !labels_contained(&desired_labels, &live.labels()) {
        patch.insert("metadata".to_string(), json!({ "labels": desired_labels }));
    }

    let spec = match (live, desired) {
        (ClusterObject::StatefulSet(l), ClusterObject::StatefulSet(d)) => {
            let live_spec = l.spec.as_ref();
            let desired_spec = d.spec.as_ref();
            workload_patch(
                live_spec.and_then(|s| s.replicas),
                desired_spec.and_then(|s| s.replicas),
                live_spec.map(|s| &s.template),
                desired_spec.map(|s| &s.template),
            )
        }
        (ClusterObject::Deployment(l), ClusterObject::Deployment(d)) => {
            let live_spec = l.spec.as_ref();
            let desired_spec = d.spec.as_ref();
            workload_patch(
                live_spec.and_then(|s| s.replicas),
                desired_spec.and_then(|s| s.replicas),
                live_spec.map(|s| &s.template),
                desired_spec.map(|s| &s.template),
            )
        }
        (ClusterObject::Service(l), ClusterObject::Service(d)) => {
            let live_ports = l.spec.as_ref().and_then(|s| s.ports.as_deref());
            let desired_ports = d.spec.as_ref().and_then(|s| s.ports.as_deref());
            service_patch(live_ports, desired_ports)
        }
        (ClusterObject::PersistentVolumeClaim(_), ClusterObject::PersistentVolumeClaim(_)) => {
            Map::new()
        }
        _ => return None,
    };
    if !spec.is_empty() {
        patch.insert("spec".to_string(), Value::Object(spec));
    }

    if patch.is_empty() {
        None
    } else {
        Some(Value::Object(patch))
    }
}

/// Whether every desired label is present with the same value.
///
/// Labels added to the live object by other actors are left alone.
fn labels_contained(desired: &BTreeMap<String, String>, live: &BTreeMap<String, String>) -> bool {
    desired.iter().all(|(k, v)| live.get(k) == Some(v))
}

fn workload_patch(
    live_replicas: Option<i32>,
    desired_replicas: Option<i32>,
    live_template: Option<&PodTemplateSpec>,
    desired_template: Option<&PodTemplateSpec>,
) -> Map<String, Value> {
    let mut spec = Map::new();

    if desired_replicas.is_some() && live_replicas != desired_replicas {
        spec.insert("replicas".to_string(), json!(desired_replicas));
    }

    let Some(desired_template) = desired_template else {
        return spec;
    };
    let mut template = Map::new();

    let desired_labels = desired_template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    let live_labels = live_template
        .and_then(|t| t.metadata.as_ref())
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    if !labels_contained(&desired_labels, &live_labels) {
        template.insert("metadata".to_string(), json!({ "labels": desired_labels }));
    }

    let desired_containers = desired_template
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    let live_containers = live_template
        .and_then(|t| t.spec.as_ref())
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    if containers_differ(live_containers, desired_containers) {
        // Merge patch replaces lists wholesale.
        template.insert(
            "spec".to_string(),
            json!({ "containers": desired_containers }),
        );
    }

    if !template.is_empty() {
        spec.insert("template".to_string(), Value::Object(template));
    }
    spec
}

fn containers_differ(live: &[Container], desired: &[Container]) -> bool {
    if live.len() != desired.len() {
        return true;
    }
    desired.iter().any(|d| match live.iter().find(|l| l.name == d.name) {
        None => true,
        Some(l) => container_differs(l, d),
    })
}

fn container_differs(live: &Container, desired: &Container) -> bool {
    live.image != desired.image
        || live.command != desired.command
        || live.env.clone().unwrap_or_default() != desired.env.clone().unwrap_or_default()
        || container_ports(live) != container_ports(desired)
        || probe_timing(live.liveness_probe.as_ref()) != probe_timing(desired.liveness_probe.as_ref())
        || probe_timing(live.readiness_probe.as_ref())
            != probe_timing(desired.readiness_probe.as_ref())
}

fn container_ports(container: &Container) -> Vec<(Option<String>, i32)> {
    container
        .ports
        .iter()
        .flatten()
        .map(|p| (p.name.clone(), p.container_port))
        .collect()
}

fn probe_timing(probe: Option<&Probe>) -> Option<(Option<i32>, Option<i32>)> {
    probe.map(|p| (p.initial_delay_seconds, p.timeout_seconds))
}

fn service_patch(
    live: Option<&[ServicePort]>,
    desired: Option<&[ServicePort]>,
) -> Map<String, Value> {
    let mut spec = Map::new();
    let Some(desired) = desired else {
        return spec;
    };
    let key = |ports: &[ServicePort]| -> Vec<_> {
        ports
            .iter()
            .map(|p| (p.name.clone(), p.port, p.target_port.clone()))
            .collect()
    };
    if live.map(key) != Some(key(desired)) {
        spec.insert("ports".to_string(), json!(desired));
    }
    spec
}
