//! Test fixtures and builder patterns for cluster documents.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kafka_cluster_operator::labels::{DEFAULT_SELECTOR, KAFKA_CONNECT_TYPE, KAFKA_TYPE, TYPE_LABEL};
use kafka_cluster_operator::{ControllerConfig, LabelPredicate};

/// Namespace used by tests that do not need their own.
pub const TEST_NAMESPACE: &str = "default";

/// The default owned scope.
pub fn default_selector() -> LabelPredicate {
    LabelPredicate::parse(DEFAULT_SELECTOR).unwrap()
}

/// Controller settings for the default scope in [`TEST_NAMESPACE`].
pub fn test_config() -> ControllerConfig {
    ControllerConfig::new(TEST_NAMESPACE, default_selector())
}

/// Builder for desired-state ConfigMaps.
///
/// # Example
/// ```
/// let document = DocumentBuilder::kafka("kafka-ex")
///     .data("kafka-nodes", "3")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct DocumentBuilder {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
}

impl DocumentBuilder {
    /// A document in the default scope without a type label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: TEST_NAMESPACE.to_string(),
            labels: default_selector().labels().clone(),
            data: BTreeMap::new(),
        }
    }

    /// A ZooKeeper + Kafka cluster document.
    pub fn kafka(name: impl Into<String>) -> Self {
        Self::new(name).label(TYPE_LABEL, KAFKA_TYPE)
    }

    /// A Kafka Connect cluster document.
    pub fn kafka_connect(name: impl Into<String>) -> Self {
        Self::new(name).label(TYPE_LABEL, KAFKA_CONNECT_TYPE)
    }

    /// Set the namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Add or replace a label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Drop a label.
    pub fn without_label(mut self, key: &str) -> Self {
        self.labels.remove(key);
        self
    }

    /// Add or replace a data entry.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Build the ConfigMap.
    pub fn build(self) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                labels: Some(self.labels),
                ..Default::default()
            },
            data: Some(self.data),
            ..Default::default()
        }
    }
}
