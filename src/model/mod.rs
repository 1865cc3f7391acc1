//! Desired-state model.
//!
//! Users declare clusters as ConfigMaps labeled with the operator's owned
//! scope and a [`TYPE_LABEL`](crate::labels::TYPE_LABEL). This module gives
//! those documents a typed shape:
//!
//! - `KafkaClusterSpec`: ZooKeeper ensemble plus Kafka brokers (type `kafka`)
//! - `KafkaConnectSpec`: Kafka Connect workers (type `kafka-connect`)
//!
//! Example:
//! ```yaml
//! apiVersion: v1
//! kind: ConfigMap
//! metadata:
//!   name: my-cluster
//!   labels:
//!     kafka-operator.io/kind: cluster
//!     kafka-operator.io/type: kafka
//! data:
//!   kafka-nodes: "3"
//!   zookeeper-nodes: "3"
//!   kafka-storage: '{"type": "persistent-claim", "size": "10Gi"}'
//! ```

mod kafka_cluster;
mod kafka_connect;
mod storage;

pub use kafka_cluster::*;
pub use kafka_connect::*;
pub use storage::*;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::ConfigMap;

use crate::controller::error::{Error, Result};
use crate::labels::{KAFKA_CONNECT_TYPE, KAFKA_TYPE};

/// Cluster family declared by a ConfigMap's type label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterType {
    /// ZooKeeper ensemble plus the Kafka brokers that depend on it.
    Kafka,
    /// Independent Kafka Connect cluster.
    KafkaConnect,
}

impl ClusterType {
    pub const ALL: [ClusterType; 2] = [ClusterType::Kafka, ClusterType::KafkaConnect];

    /// Value of the type label for this family.
    pub fn label_value(&self) -> &'static str {
        match self {
            ClusterType::Kafka => KAFKA_TYPE,
            ClusterType::KafkaConnect => KAFKA_CONNECT_TYPE,
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_value())
    }
}

impl FromStr for ClusterType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            KAFKA_TYPE => Ok(ClusterType::Kafka),
            KAFKA_CONNECT_TYPE => Ok(ClusterType::KafkaConnect),
            _ => Err(format!("Unknown cluster type: {}", s)),
        }
    }
}

/// Role of a set of objects inside a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterRole {
    /// Coordination layer of a Kafka cluster.
    Zookeeper,
    /// Brokers of a Kafka cluster.
    Kafka,
    /// Kafka Connect workers.
    KafkaConnect,
}

impl ClusterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterRole::Zookeeper => "zookeeper",
            ClusterRole::Kafka => "kafka",
            ClusterRole::KafkaConnect => "kafka-connect",
        }
    }
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read a ConfigMap's data, treating a missing `data` section as empty.
pub(crate) fn document_data(config_map: &ConfigMap) -> BTreeMap<String, String> {
    config_map.data.clone().unwrap_or_default()
}

/// Parse an optional field, falling back to `default` when absent.
pub(crate) fn parse_field<T>(
    data: &BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match data.get(key).map(|raw| raw.trim()) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::InvalidDocument(format!("field '{}' = '{}': {}", key, raw, e))),
    }
}

/// Parse a replica count that must be at least 1.
pub(crate) fn parse_replicas(
    data: &BTreeMap<String, String>,
    key: &str,
    default: i32,
) -> Result<i32> {
    let replicas = parse_field(data, key, default)?;
    if replicas < 1 {
        return Err(Error::InvalidDocument(format!(
            "field '{}' must be at least 1, got {}",
            key, replicas
        )));
    }
    Ok(replicas)
}

/// Read an optional string field.
pub(crate) fn string_field(data: &BTreeMap<String, String>, key: &str, default: &str) -> String {
    data.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}
