//! Kafka cluster documents: a ZooKeeper ensemble plus Kafka brokers.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use super::{StorageSpec, document_data, parse_field, parse_replicas, string_field};
use crate::controller::error::Result;

pub const KAFKA_NODES_KEY: &str = "kafka-nodes";
pub const KAFKA_IMAGE_KEY: &str = "kafka-image";
pub const KAFKA_HEALTHCHECK_DELAY_KEY: &str = "kafka-healthcheck-delay";
pub const KAFKA_HEALTHCHECK_TIMEOUT_KEY: &str = "kafka-healthcheck-timeout";
pub const KAFKA_STORAGE_KEY: &str = "kafka-storage";
pub const ZOOKEEPER_NODES_KEY: &str = "zookeeper-nodes";
pub const ZOOKEEPER_IMAGE_KEY: &str = "zookeeper-image";
pub const ZOOKEEPER_HEALTHCHECK_DELAY_KEY: &str = "zookeeper-healthcheck-delay";
pub const ZOOKEEPER_HEALTHCHECK_TIMEOUT_KEY: &str = "zookeeper-healthcheck-timeout";
pub const ZOOKEEPER_STORAGE_KEY: &str = "zookeeper-storage";
pub const DEFAULT_REPLICATION_FACTOR_KEY: &str = "KAFKA_DEFAULT_REPLICATION_FACTOR";
pub const OFFSETS_TOPIC_REPLICATION_FACTOR_KEY: &str = "KAFKA_OFFSETS_TOPIC_REPLICATION_FACTOR";
pub const TRANSACTION_STATE_LOG_REPLICATION_FACTOR_KEY: &str =
    "KAFKA_TRANSACTION_STATE_LOG_REPLICATION_FACTOR";

pub const DEFAULT_KAFKA_IMAGE: &str = "apache/kafka:3.9.0";
pub const DEFAULT_ZOOKEEPER_IMAGE: &str = "zookeeper:3.9";

const DEFAULT_KAFKA_NODES: i32 = 3;
const DEFAULT_ZOOKEEPER_NODES: i32 = 1;
const DEFAULT_HEALTHCHECK_DELAY: i32 = 15;
const DEFAULT_HEALTHCHECK_TIMEOUT: i32 = 5;
const DEFAULT_REPLICATION_FACTOR: i32 = 3;

/// Probe timing for a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthCheck {
    /// Seconds before the first probe.
    pub initial_delay: i32,
    /// Probe timeout in seconds.
    pub timeout: i32,
}

/// ZooKeeper ensemble settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZookeeperSpec {
    pub replicas: i32,
    pub image: String,
    pub health_check: HealthCheck,
    pub storage: StorageSpec,
}

/// Kafka broker settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KafkaSpec {
    pub replicas: i32,
    pub image: String,
    pub health_check: HealthCheck,
    pub storage: StorageSpec,
    pub default_replication_factor: i32,
    pub offsets_topic_replication_factor: i32,
    pub transaction_state_log_replication_factor: i32,
}

/// Typed view of a `kafka` ConfigMap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KafkaClusterSpec {
    /// ConfigMap name, also the cluster name.
    pub name: String,
    pub zookeeper: ZookeeperSpec,
    pub kafka: KafkaSpec,
}

impl KafkaClusterSpec {
    /// Parse a Kafka cluster ConfigMap, applying defaults for missing keys.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self> {
        let data = document_data(config_map);

        let zookeeper = ZookeeperSpec {
            replicas: parse_replicas(&data, ZOOKEEPER_NODES_KEY, DEFAULT_ZOOKEEPER_NODES)?,
            image: string_field(&data, ZOOKEEPER_IMAGE_KEY, DEFAULT_ZOOKEEPER_IMAGE),
            health_check: HealthCheck {
                initial_delay: parse_field(
                    &data,
                    ZOOKEEPER_HEALTHCHECK_DELAY_KEY,
                    DEFAULT_HEALTHCHECK_DELAY,
                )?,
                timeout: parse_field(
                    &data,
                    ZOOKEEPER_HEALTHCHECK_TIMEOUT_KEY,
                    DEFAULT_HEALTHCHECK_TIMEOUT,
                )?,
            },
            storage: StorageSpec::parse(data.get(ZOOKEEPER_STORAGE_KEY).map(String::as_str))?,
        };

        let kafka = KafkaSpec {
            replicas: parse_replicas(&data, KAFKA_NODES_KEY, DEFAULT_KAFKA_NODES)?,
            image: string_field(&data, KAFKA_IMAGE_KEY, DEFAULT_KAFKA_IMAGE),
            health_check: HealthCheck {
                initial_delay: parse_field(
                    &data,
                    KAFKA_HEALTHCHECK_DELAY_KEY,
                    DEFAULT_HEALTHCHECK_DELAY,
                )?,
                timeout: parse_field(
                    &data,
                    KAFKA_HEALTHCHECK_TIMEOUT_KEY,
                    DEFAULT_HEALTHCHECK_TIMEOUT,
                )?,
            },
            storage: StorageSpec::parse(data.get(KAFKA_STORAGE_KEY).map(String::as_str))?,
            default_replication_factor: parse_field(
                &data,
                DEFAULT_REPLICATION_FACTOR_KEY,
                DEFAULT_REPLICATION_FACTOR,
            )?,
            offsets_topic_replication_factor: parse_field(
                &data,
                OFFSETS_TOPIC_REPLICATION_FACTOR_KEY,
                DEFAULT_REPLICATION_FACTOR,
            )?,
            transaction_state_log_replication_factor: parse_field(
                &data,
                TRANSACTION_STATE_LOG_REPLICATION_FACTOR_KEY,
                DEFAULT_REPLICATION_FACTOR,
            )?,
        };

        Ok(Self {
            name: config_map.name_any(),
            zookeeper,
            kafka,
        })
    }
}
