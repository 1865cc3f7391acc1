//! Watch-based condition waiting utilities.
//!
//! Provides functions to wait for objects to reach specific states
//! using the Kubernetes watch API.

use std::fmt::Debug;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::Resource;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use tokio::time::timeout;

/// Default time to wait for the controller to act.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(60);

/// Error type for wait operations.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("Timeout waiting for condition after {0:?}")]
    Timeout(Duration),

    #[error("Resource was deleted while waiting")]
    ResourceDeleted,

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Watcher error: {0}")]
    WatcherError(#[from] watcher::Error),

    #[error("Watch stream ended unexpectedly")]
    StreamEnded,
}

/// Wait for a resource to satisfy a condition.
///
/// Returns the resource when the condition is satisfied, or an error on
/// timeout.
pub async fn wait_for_condition<K, F>(
    api: &Api<K>,
    name: &str,
    condition: F,
    timeout_duration: Duration,
) -> Result<K, WaitError>
where
    K: Resource + Clone + Debug + Send + 'static,
    K: serde::de::DeserializeOwned,
    <K as Resource>::DynamicType: Default,
    F: Fn(&K) -> bool,
{
    let watch_future = async {
        let mut stream = watcher::watcher(
            api.clone(),
            watcher::Config::default().fields(&format!("metadata.name={}", name)),
        )
        .boxed();

        if let Ok(Some(resource)) = api.get_opt(name).await
            && condition(&resource)
        {
            return Ok(resource);
        }

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(resource)) | Ok(Event::InitApply(resource)) => {
                    if condition(&resource) {
                        return Ok(resource);
                    }
                }
                Ok(Event::Delete(_)) => {
                    return Err(WaitError::ResourceDeleted);
                }
                Ok(Event::Init) | Ok(Event::InitDone) => {}
                Err(e) => {
                    return Err(WaitError::WatcherError(e));
                }
            }
        }

        Err(WaitError::StreamEnded)
    };

    timeout(timeout_duration, watch_future)
        .await
        .map_err(|_| WaitError::Timeout(timeout_duration))?
}

/// Wait for a resource to exist.
pub async fn wait_for_resource<K>(
    api: &Api<K>,
    name: &str,
    timeout_duration: Duration,
) -> Result<K, WaitError>
where
    K: Resource + Clone + Debug + Send + 'static,
    K: serde::de::DeserializeOwned,
    <K as Resource>::DynamicType: Default,
{
    wait_for_condition(api, name, |_| true, timeout_duration).await
}

/// Wait for a resource to be deleted.
pub async fn wait_for_deletion<K>(
    api: &Api<K>,
    name: &str,
    timeout_duration: Duration,
) -> Result<(), WaitError>
where
    K: Resource + Clone + Debug + Send + 'static,
    K: serde::de::DeserializeOwned,
    <K as Resource>::DynamicType: Default,
{
    timeout(timeout_duration, watch_deletion(api, name))
        .await
        .map_err(|_| WaitError::Timeout(timeout_duration))?
}

async fn watch_deletion<K>(api: &Api<K>, name: &str) -> Result<(), WaitError>
where
    K: Resource + Clone + Debug + Send + 'static,
    K: serde::de::DeserializeOwned,
    <K as Resource>::DynamicType: Default,
{
    if api.get_opt(name).await?.is_none() {
        return Ok(());
    }

    let mut stream = watcher::watcher(
        api.clone(),
        watcher::Config::default().fields(&format!("metadata.name={}", name)),
    )
    .boxed();

    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Delete(_)) => return Ok(()),
            // The object may be gone before the watch starts
            Ok(Event::InitDone) => {
                if api.get_opt(name).await?.is_none() {
                    return Ok(());
                }
            }
            Ok(_) => continue,
            Err(e) => return Err(WaitError::WatcherError(e)),
        }
    }

    Err(WaitError::StreamEnded)
}

/// Check a StatefulSet's desired replica count.
pub fn has_statefulset_replicas(sts: &StatefulSet, replicas: i32) -> bool {
    sts.spec.as_ref().and_then(|s| s.replicas) == Some(replicas)
}

/// Check a Deployment's desired replica count.
pub fn has_deployment_replicas(deployment: &Deployment, replicas: i32) -> bool {
    deployment.spec.as_ref().and_then(|s| s.replicas) == Some(replicas)
}
