//! Label selectors and the labeling convention used for ownership scoping.
//!
//! A [`LabelPredicate`] is an equality-only Kubernetes label selector
//! (`k1=v1,k2=v2`). It scopes the ConfigMap watch, the reconciliation listings
//! and the label checks applied to incoming watch notifications.
//!
//! Syntax follows the Kubernetes label rules:
//! - key: optional DNS-subdomain prefix followed by `/`, then a name of at most
//!   63 characters (`[A-Za-z0-9_.-]`, alphanumeric at both ends)
//! - value: empty, or the same rule as a key name
//!
//! Set-based operators (`in`, `notin`, `exists`) and inequality (`!=`) are not
//! supported.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;
use thiserror::Error;

/// Label domain for every label the operator reads or writes.
pub const LABEL_DOMAIN: &str = "kafka-operator.io";

/// Cluster family of a ConfigMap and of everything created from it.
pub const TYPE_LABEL: &str = "kafka-operator.io/type";

/// Back-reference from a live object to the ConfigMap it was created from.
pub const CLUSTER_LABEL: &str = "kafka-operator.io/cluster";

/// Name of the object itself.
pub const NAME_LABEL: &str = "kafka-operator.io/name";

/// Role of a live object inside its cluster (zookeeper, kafka, kafka-connect).
pub const ROLE_LABEL: &str = "kafka-operator.io/role";

/// Standard Kubernetes managed-by label.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on every object this operator creates.
pub const MANAGED_BY: &str = "kafka-cluster-operator";

/// Type value for a paired ZooKeeper + Kafka cluster.
pub const KAFKA_TYPE: &str = "kafka";

/// Type value for a Kafka Connect cluster.
pub const KAFKA_CONNECT_TYPE: &str = "kafka-connect";

/// Default owned scope for desired-state ConfigMaps.
pub const DEFAULT_SELECTOR: &str = "kafka-operator.io/kind=cluster";

const MAX_NAME_LENGTH: usize = 63;
const MAX_PREFIX_LENGTH: usize = 253;

/// Errors from building or parsing a label selector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label selector is empty")]
    Empty,

    #[error("label selector has an empty term (leading, trailing or doubled comma)")]
    EmptyTerm,

    #[error("label selector term '{0}' must have the form key=value")]
    MalformedTerm(String),

    #[error("invalid label key '{0}'")]
    InvalidKey(String),

    #[error("invalid value '{value}' for label '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("label key '{0}' appears more than once")]
    DuplicateKey(String),

    #[error("expected an even number of key/value arguments, got {0}")]
    OddPairs(usize),
}

static NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").ok());

// DNS subdomain where each dot-separated label starts with a letter.
static PREFIX_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?(\.[a-z]([-a-z0-9]{0,61}[a-z0-9])?)*$").ok()
});

fn is_valid_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LENGTH && NAME_RE.as_ref().is_some_and(|re| re.is_match(name))
}

fn is_valid_prefix(prefix: &str) -> bool {
    prefix.len() <= MAX_PREFIX_LENGTH && PREFIX_RE.as_ref().is_some_and(|re| re.is_match(prefix))
}

/// Check a label key: `[prefix/]name`.
pub fn is_valid_key(key: &str) -> bool {
    match key.split_once('/') {
        Some((prefix, name)) => is_valid_prefix(prefix) && is_valid_name(name),
        None => is_valid_name(key),
    }
}

/// Check a label value: empty, or a valid name.
pub fn is_valid_value(value: &str) -> bool {
    value.is_empty() || is_valid_name(value)
}

/// Equality-only label selector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LabelPredicate {
    labels: BTreeMap<String, String>,
}

impl LabelPredicate {
    /// Build a predicate from alternating key/value strings.
    ///
    /// `from_pairs(&["app", "kafka", "tier", "data"])` selects `app=kafka,tier=data`.
    pub fn from_pairs(pairs: &[&str]) -> Result<Self, LabelError> {
        if pairs.len() % 2 != 0 {
            return Err(LabelError::OddPairs(pairs.len()));
        }
        let mut predicate = Self::default();
        for pair in pairs.chunks_exact(2) {
            if let [key, value] = pair {
                predicate.insert(key, value)?;
            }
        }
        Ok(predicate)
    }

    /// Parse a selector of the form `k1=v1,k2=v2`.
    pub fn parse(selector: &str) -> Result<Self, LabelError> {
        if selector.is_empty() {
            return Err(LabelError::Empty);
        }
        let mut predicate = Self::default();
        for term in selector.split(',') {
            if term.is_empty() {
                return Err(LabelError::EmptyTerm);
            }
            if term.matches('=').count() != 1 {
                return Err(LabelError::MalformedTerm(term.to_string()));
            }
            let Some((key, value)) = term.split_once('=') else {
                return Err(LabelError::MalformedTerm(term.to_string()));
            };
            predicate.insert(key, value)?;
        }
        Ok(predicate)
    }

    fn insert(&mut self, key: &str, value: &str) -> Result<(), LabelError> {
        if !is_valid_key(key) {
            return Err(LabelError::InvalidKey(key.to_string()));
        }
        if !is_valid_value(value) {
            return Err(LabelError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        if self
            .labels
            .insert(key.to_string(), value.to_string())
            .is_some()
        {
            return Err(LabelError::DuplicateKey(key.to_string()));
        }
        Ok(())
    }

    /// Copy of this predicate with one more required label.
    ///
    /// An existing term with the same key is replaced.
    pub fn with(&self, key: &str, value: &str) -> Result<Self, LabelError> {
        let mut labels = self.labels.clone();
        labels.remove(key);
        let mut predicate = Self { labels };
        predicate.insert(key, value)?;
        Ok(predicate)
    }

    /// The required labels.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// True if `labels` contains every required key with the exact value.
    ///
    /// Extra labels are ignored.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    /// Match against an object's metadata. Objects without labels only match
    /// an empty predicate.
    pub fn matches_object(&self, metadata: &ObjectMeta) -> bool {
        match &metadata.labels {
            Some(labels) => self.matches(labels),
            None => self.is_empty(),
        }
    }
}

impl fmt::Display for LabelPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.labels {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for LabelPredicate {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
