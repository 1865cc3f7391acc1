//! Watch notification classification.
//!
//! Maps each [`WatchNotification`] to what the event loop should do with
//! it. Classification has no side effects; the event loop acts on the
//! returned [`Dispatch`].

use k8s_openapi::api::core::v1::ConfigMap;

use crate::controller::chain::{Chain, ChainKind};
use crate::gateway::WatchNotification;
use crate::labels::{LabelPredicate, TYPE_LABEL};
use crate::model::ClusterType;

/// What to do with a watch notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Run this chain.
    Chain(Chain),
    /// The watch reported an error; run a reconciliation pass.
    Reconcile,
    /// Nothing to do, with the reason.
    Ignored(String),
    /// The watch ended and must be re-established.
    Closed(Option<String>),
}

/// Classify `notification` for a controller owning `selector` in `namespace`.
pub fn dispatch(
    notification: WatchNotification,
    namespace: &str,
    selector: &LabelPredicate,
) -> Dispatch {
    let (kind, config_map) = match notification {
        WatchNotification::Added(cm) => (ChainKind::Add, cm),
        WatchNotification::Modified(cm) => (ChainKind::Update, cm),
        WatchNotification::Deleted(cm) => (ChainKind::Delete, cm),
        WatchNotification::Error(_) => return Dispatch::Reconcile,
        WatchNotification::Closed(reason) => return Dispatch::Closed(reason),
    };
    classify(kind, &config_map, namespace, selector)
}

fn classify(
    kind: ChainKind,
    config_map: &ConfigMap,
    namespace: &str,
    selector: &LabelPredicate,
) -> Dispatch {
    let Some(name) = config_map.metadata.name.as_deref() else {
        return Dispatch::Ignored("ConfigMap has no name".to_string());
    };
    if !selector.matches_object(&config_map.metadata) {
        return Dispatch::Ignored(format!("ConfigMap {} is outside {}", name, selector));
    }
    let Some(type_value) = config_map
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(TYPE_LABEL))
    else {
        return Dispatch::Ignored(format!("ConfigMap {} has no {} label", name, TYPE_LABEL));
    };
    let Ok(cluster_type) = type_value.parse::<ClusterType>() else {
        return Dispatch::Ignored(format!(
            "ConfigMap {} has unknown cluster type {:?}",
            name, type_value
        ));
    };
    Dispatch::Chain(Chain::new(kind, cluster_type, namespace, name))
}
