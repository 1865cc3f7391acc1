//! Kafka Connect cluster documents.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use super::{HealthCheck, document_data, parse_field, parse_replicas, string_field};
use crate::controller::error::Result;

pub const CONNECT_NODES_KEY: &str = "nodes";
pub const CONNECT_IMAGE_KEY: &str = "image";
pub const CONNECT_HEALTHCHECK_DELAY_KEY: &str = "healthcheck-delay";
pub const CONNECT_HEALTHCHECK_TIMEOUT_KEY: &str = "healthcheck-timeout";

pub const DEFAULT_CONNECT_IMAGE: &str = "apache/kafka:3.9.0";

const DEFAULT_CONNECT_NODES: i32 = 1;
const DEFAULT_HEALTHCHECK_DELAY: i32 = 60;
const DEFAULT_HEALTHCHECK_TIMEOUT: i32 = 5;
const JSON_CONVERTER: &str = "org.apache.kafka.connect.json.JsonConverter";

/// Worker settings passed through as container environment, with defaults.
const CONNECT_ENV_DEFAULTS: &[(&str, &str)] = &[
    ("KAFKA_CONNECT_BOOTSTRAP_SERVERS", "kafka:9092"),
    ("KAFKA_CONNECT_GROUP_ID", "connect-cluster"),
    ("KAFKA_CONNECT_KEY_CONVERTER", JSON_CONVERTER),
    ("KAFKA_CONNECT_VALUE_CONVERTER", JSON_CONVERTER),
    ("KAFKA_CONNECT_KEY_CONVERTER_SCHEMAS_ENABLE", "true"),
    ("KAFKA_CONNECT_VALUE_CONVERTER_SCHEMAS_ENABLE", "true"),
    ("KAFKA_CONNECT_CONFIG_STORAGE_REPLICATION_FACTOR", "3"),
    ("KAFKA_CONNECT_OFFSET_STORAGE_REPLICATION_FACTOR", "3"),
    ("KAFKA_CONNECT_STATUS_STORAGE_REPLICATION_FACTOR", "3"),
];

/// Typed view of a `kafka-connect` ConfigMap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KafkaConnectSpec {
    /// ConfigMap name, also the cluster name.
    pub name: String,
    pub replicas: i32,
    pub image: String,
    pub health_check: HealthCheck,
    /// Worker configuration exported to the container environment.
    pub worker_config: BTreeMap<String, String>,
}

impl KafkaConnectSpec {
    /// Parse a Kafka Connect ConfigMap, applying defaults for missing keys.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self> {
        let data = document_data(config_map);

        let worker_config = CONNECT_ENV_DEFAULTS
            .iter()
            .map(|(key, default)| (key.to_string(), string_field(&data, key, default)))
            .collect();

        Ok(Self {
            name: config_map.name_any(),
            replicas: parse_replicas(&data, CONNECT_NODES_KEY, DEFAULT_CONNECT_NODES)?,
            image: string_field(&data, CONNECT_IMAGE_KEY, DEFAULT_CONNECT_IMAGE),
            health_check: HealthCheck {
                initial_delay: parse_field(
                    &data,
                    CONNECT_HEALTHCHECK_DELAY_KEY,
                    DEFAULT_HEALTHCHECK_DELAY,
                )?,
                timeout: parse_field(
                    &data,
                    CONNECT_HEALTHCHECK_TIMEOUT_KEY,
                    DEFAULT_HEALTHCHECK_TIMEOUT,
                )?,
            },
            worker_config,
        })
    }
}
