//! [`ClusterGateway`] over the Kubernetes API.

use std::fmt::Debug;
use std::pin::pin;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::api::{
    Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchEvent, WatchParams,
};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ClusterGateway, ClusterObject, ObjectKind, WatchHandle, WatchNotification};
use crate::controller::error::{Error, Result};
use crate::labels::LabelPredicate;

/// Gateway backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn list_params(selector: &LabelPredicate) -> ListParams {
    ListParams::default().labels(&selector.to_string())
}

async fn create_object<K>(api: Api<K>, object: &K) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), object).await {
        Ok(_) => {
            debug!(name = %object.name_any(), "Created object");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 409 => {
            debug!(name = %object.name_any(), "Object already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete_object<K>(api: Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            debug!(name = %name, "Deleted object");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            debug!(name = %name, "Object already absent");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn patch_object<K>(api: Api<K>, name: &str, patch: &serde_json::Value) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn list_documents(
        &self,
        namespace: &str,
        selector: &LabelPredicate,
    ) -> Result<Vec<ConfigMap>> {
        let api: Api<ConfigMap> = self.api(namespace);
        Ok(api.list(&list_params(selector)).await?.items)
    }

    async fn get_document(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = self.api(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_instances(
        &self,
        namespace: &str,
        kind: ObjectKind,
        selector: &LabelPredicate,
    ) -> Result<Vec<ClusterObject>> {
        let params = list_params(selector);
        let objects = match kind {
            ObjectKind::StatefulSet => self
                .api::<StatefulSet>(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(ClusterObject::StatefulSet)
                .collect(),
            ObjectKind::Deployment => self
                .api::<Deployment>(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(ClusterObject::Deployment)
                .collect(),
            ObjectKind::Service => self
                .api::<Service>(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(ClusterObject::Service)
                .collect(),
            ObjectKind::PersistentVolumeClaim => self
                .api::<PersistentVolumeClaim>(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(ClusterObject::PersistentVolumeClaim)
                .collect(),
        };
        Ok(objects)
    }

    async fn get(
        &self,
        namespace: &str,
        kind: ObjectKind,
        name: &str,
    ) -> Result<Option<ClusterObject>> {
        let object = match kind {
            ObjectKind::StatefulSet => self
                .api::<StatefulSet>(namespace)
                .get_opt(name)
                .await?
                .map(ClusterObject::StatefulSet),
            ObjectKind::Deployment => self
                .api::<Deployment>(namespace)
                .get_opt(name)
                .await?
                .map(ClusterObject::Deployment),
            ObjectKind::Service => self
                .api::<Service>(namespace)
                .get_opt(name)
                .await?
                .map(ClusterObject::Service),
            ObjectKind::PersistentVolumeClaim => self
                .api::<PersistentVolumeClaim>(namespace)
                .get_opt(name)
                .await?
                .map(ClusterObject::PersistentVolumeClaim),
        };
        Ok(object)
    }

    async fn create(&self, object: &ClusterObject) -> Result<()> {
        let namespace = object
            .namespace()
            .ok_or_else(|| Error::InvalidDocument(format!("{} has no namespace", object.name())))?;
        match object {
            ClusterObject::StatefulSet(o) => create_object(self.api(&namespace), o).await,
            ClusterObject::Deployment(o) => create_object(self.api(&namespace), o).await,
            ClusterObject::Service(o) => create_object(self.api(&namespace), o).await,
            ClusterObject::PersistentVolumeClaim(o) => {
                create_object(self.api(&namespace), o).await
            }
        }
    }

    async fn patch(
        &self,
        namespace: &str,
        kind: ObjectKind,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        match kind {
            ObjectKind::StatefulSet => {
                patch_object(self.api::<StatefulSet>(namespace), name, patch).await
            }
            ObjectKind::Deployment => {
                patch_object(self.api::<Deployment>(namespace), name, patch).await
            }
            ObjectKind::Service => patch_object(self.api::<Service>(namespace), name, patch).await,
            ObjectKind::PersistentVolumeClaim => {
                patch_object(self.api::<PersistentVolumeClaim>(namespace), name, patch).await
            }
        }
    }

    async fn delete(&self, namespace: &str, kind: ObjectKind, name: &str) -> Result<()> {
        match kind {
            ObjectKind::StatefulSet => delete_object(self.api::<StatefulSet>(namespace), name).await,
            ObjectKind::Deployment => delete_object(self.api::<Deployment>(namespace), name).await,
            ObjectKind::Service => delete_object(self.api::<Service>(namespace), name).await,
            ObjectKind::PersistentVolumeClaim => {
                delete_object(self.api::<PersistentVolumeClaim>(namespace), name).await
            }
        }
    }

    async fn watch(
        &self,
        namespace: &str,
        selector: &LabelPredicate,
        sink: mpsc::Sender<WatchNotification>,
    ) -> Result<WatchHandle> {
        let api: Api<ConfigMap> = self.api(namespace);
        let selector = selector.to_string();

        // Start from the current resource version so existing ConfigMaps are
        // not replayed as Added; the reconciliation pass covers them.
        let list = api
            .list_metadata(&ListParams::default().labels(&selector))
            .await?;
        let version = list
            .metadata
            .resource_version
            .unwrap_or_else(|| "0".to_string());

        let (opened_tx, opened_rx) = oneshot::channel();
        let task = tokio::spawn(pump_watch(api, selector.clone(), version, sink, opened_tx));

        match opened_rx.await {
            Ok(Ok(())) => {
                info!(selector = %selector, "ConfigMap watch established");
                Ok(WatchHandle::new(task))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::WatchFailed(
                "watch task exited before the stream opened".to_string(),
            )),
        }
    }
}

/// Forward watch events to `sink` until the stream ends, then send `Closed`.
async fn pump_watch(
    api: Api<ConfigMap>,
    selector: String,
    version: String,
    sink: mpsc::Sender<WatchNotification>,
    opened: oneshot::Sender<std::result::Result<(), kube::Error>>,
) {
    let params = WatchParams::default().labels(&selector);
    let stream = match api.watch(&params, &version).await {
        Ok(stream) => {
            let _ = opened.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };
    let mut stream = pin!(stream);

    let mut close_reason = None;
    while let Some(event) = stream.next().await {
        let notification = match event {
            Ok(WatchEvent::Added(cm)) => WatchNotification::Added(cm),
            Ok(WatchEvent::Modified(cm)) => WatchNotification::Modified(cm),
            Ok(WatchEvent::Deleted(cm)) => WatchNotification::Deleted(cm),
            Ok(WatchEvent::Bookmark(_)) => continue,
            Ok(WatchEvent::Error(e)) => {
                WatchNotification::Error(format!("{} (code {})", e.message, e.code))
            }
            Err(e) => {
                warn!(error = %e, "ConfigMap watch stream failed");
                close_reason = Some(e.to_string());
                break;
            }
        };
        if sink.send(notification).await.is_err() {
            // Receiver dropped: the watch has been replaced or stopped
            return;
        }
    }

    let _ = sink.send(WatchNotification::Closed(close_reason)).await;
}
