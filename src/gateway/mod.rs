//! Orchestration gateway: typed access to the Kubernetes objects the
//! controller reads and writes.
//!
//! ## Architecture
//!
//! - [`ClusterGateway`]: the trait the controller is written against
//! - `kube_gateway`: production implementation over `kube::Api`
//! - [`ClusterObject`] / [`ObjectKind`]: the object kinds a cluster is built from
//! - [`WatchNotification`] / [`WatchHandle`]: ConfigMap watch plumbing
//!
//! `create` and `delete` are idempotent: creating an object that already
//! exists and deleting one that is already gone both succeed.

mod kube_gateway;

pub use kube_gateway::KubeGateway;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::controller::error::Result;
use crate::labels::LabelPredicate;

/// Kinds of objects a cluster is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    StatefulSet,
    Deployment,
    Service,
    PersistentVolumeClaim,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::StatefulSet => write!(f, "StatefulSet"),
            ObjectKind::Deployment => write!(f, "Deployment"),
            ObjectKind::Service => write!(f, "Service"),
            ObjectKind::PersistentVolumeClaim => write!(f, "PersistentVolumeClaim"),
        }
    }
}

/// A live or desired object belonging to a cluster.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterObject {
    StatefulSet(StatefulSet),
    Deployment(Deployment),
    Service(Service),
    PersistentVolumeClaim(PersistentVolumeClaim),
}

impl ClusterObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ClusterObject::StatefulSet(_) => ObjectKind::StatefulSet,
            ClusterObject::Deployment(_) => ObjectKind::Deployment,
            ClusterObject::Service(_) => ObjectKind::Service,
            ClusterObject::PersistentVolumeClaim(_) => ObjectKind::PersistentVolumeClaim,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ClusterObject::StatefulSet(o) => &o.metadata,
            ClusterObject::Deployment(o) => &o.metadata,
            ClusterObject::Service(o) => &o.metadata,
            ClusterObject::PersistentVolumeClaim(o) => &o.metadata,
        }
    }

    /// Object name, empty if unset.
    pub fn name(&self) -> String {
        self.metadata().name.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<String> {
        self.metadata().namespace.clone()
    }

    /// Object labels, empty if unset.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata().labels.clone().unwrap_or_default()
    }

    /// Value of a single label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata()
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Value of a single annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata()
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }
}

/// A notification delivered by a ConfigMap watch.
#[derive(Clone, Debug)]
pub enum WatchNotification {
    Added(ConfigMap),
    Modified(ConfigMap),
    Deleted(ConfigMap),
    /// Error event reported by the API server inside the watch stream.
    Error(String),
    /// The watch ended; carries the transport error, if any. No further
    /// notifications follow on this sink.
    Closed(Option<String>),
}

/// Ownership of a running watch. Closing or dropping the handle stops it.
#[derive(Debug)]
pub struct WatchHandle {
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Handle for a watch pumped by `task`.
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Handle for a watch with no background task of its own.
    pub fn detached() -> Self {
        Self { task: None }
    }

    /// Stop the watch.
    pub fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Typed list/watch/create/patch/delete over the controller's object kinds.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// List desired-state ConfigMaps matching `selector`.
    async fn list_documents(
        &self,
        namespace: &str,
        selector: &LabelPredicate,
    ) -> Result<Vec<ConfigMap>>;

    /// Fetch one desired-state ConfigMap.
    async fn get_document(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// List live objects of `kind` matching `selector`.
    async fn list_instances(
        &self,
        namespace: &str,
        kind: ObjectKind,
        selector: &LabelPredicate,
    ) -> Result<Vec<ClusterObject>>;

    /// Fetch one live object.
    async fn get(
        &self,
        namespace: &str,
        kind: ObjectKind,
        name: &str,
    ) -> Result<Option<ClusterObject>>;

    /// Create an object. An object that already exists is not an error.
    async fn create(&self, object: &ClusterObject) -> Result<()>;

    /// Apply a JSON merge patch to an existing object.
    async fn patch(
        &self,
        namespace: &str,
        kind: ObjectKind,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<()>;

    /// Delete an object. An object that is already gone is not an error.
    async fn delete(&self, namespace: &str, kind: ObjectKind, name: &str) -> Result<()>;

    /// Watch ConfigMaps matching `selector`, delivering notifications to
    /// `sink` until the returned handle is closed or the stream ends.
    ///
    /// Returns an error if the watch cannot be established.
    async fn watch(
        &self,
        namespace: &str,
        selector: &LabelPredicate,
        sink: mpsc::Sender<WatchNotification>,
    ) -> Result<WatchHandle>;
}
