//! Storage configuration for ZooKeeper and Kafka StatefulSets.

use serde::{Deserialize, Serialize};

use crate::controller::error::{Error, Result};

/// Default volume size for persistent claims.
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

/// Storage backing a StatefulSet's data volume.
///
/// Serialized as JSON inside the ConfigMap:
/// `{"type": "ephemeral"}` or
/// `{"type": "persistent-claim", "size": "10Gi", "class": "fast"}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StorageSpec {
    /// emptyDir volume, lost with the pod.
    #[default]
    Ephemeral,
    /// PersistentVolumeClaim template per replica.
    PersistentClaim {
        #[serde(default = "default_size")]
        size: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class: Option<String>,
        /// Remove claims when the cluster is deleted.
        #[serde(default, rename = "delete-claim")]
        delete_claim: bool,
    },
}

fn default_size() -> String {
    DEFAULT_STORAGE_SIZE.to_string()
}

impl StorageSpec {
    /// Parse the JSON form, treating a missing value as ephemeral.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(StorageSpec::Ephemeral),
            Some(json) => serde_json::from_str(json)
                .map_err(|e| Error::InvalidDocument(format!("storage '{}': {}", json, e))),
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, StorageSpec::PersistentClaim { .. })
    }
}
