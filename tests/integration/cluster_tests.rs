//! End-to-end cluster lifecycle against a real API server.
//!
//! These tests verify that the controller:
//! - Creates ZooKeeper, Kafka and Kafka Connect objects from documents
//! - Applies document changes to live objects
//! - Removes clusters whose documents are deleted

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, DeleteParams, PostParams};
use kafka_cluster_operator::labels::{CLUSTER_LABEL, ROLE_LABEL};

use crate::common::DocumentBuilder;
use crate::namespace::TestNamespace;
use crate::operator::ScopedOperator;
use crate::wait::{
    DEFAULT_WAIT, has_deployment_replicas, has_statefulset_replicas, wait_for_condition,
    wait_for_deletion, wait_for_resource,
};
use crate::init_test;

async fn create_document(api: &Api<ConfigMap>, document: &ConfigMap) {
    api.create(&PostParams::default(), document)
        .await
        .expect("Failed to create cluster document");
}

async fn replace_document(api: &Api<ConfigMap>, document: ConfigMap) {
    let name = document.metadata.name.clone().unwrap();
    let mut document = document;
    document.metadata.resource_version = api.get(&name).await.unwrap().metadata.resource_version;
    api.replace(&name, &PostParams::default(), &document)
        .await
        .expect("Failed to update cluster document");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_kafka_document_creates_cluster() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "kafka-create").await;
    let operator = ScopedOperator::start(client.clone(), test_ns.name()).await;

    let documents: Api<ConfigMap> = test_ns.api();
    let statefulsets: Api<StatefulSet> = test_ns.api();
    let services: Api<Service> = test_ns.api();

    create_document(
        &documents,
        &DocumentBuilder::kafka("kafka-ex")
            .namespace(test_ns.name())
            .data("kafka-nodes", "3")
            .build(),
    )
    .await;

    let zookeeper = wait_for_resource(&statefulsets, "kafka-ex-zookeeper", DEFAULT_WAIT)
        .await
        .expect("ZooKeeper StatefulSet should be created");
    assert_eq!(zookeeper.metadata.labels.as_ref().unwrap()[ROLE_LABEL], "zookeeper");

    let kafka = wait_for_condition(
        &statefulsets,
        "kafka-ex-kafka",
        |sts| has_statefulset_replicas(sts, 3),
        DEFAULT_WAIT,
    )
    .await
    .expect("Kafka StatefulSet should be created with 3 replicas");
    assert_eq!(kafka.metadata.labels.as_ref().unwrap()[CLUSTER_LABEL], "kafka-ex");

    for name in [
        "kafka-ex-zookeeper",
        "kafka-ex-zookeeper-headless",
        "kafka-ex-kafka",
        "kafka-ex-kafka-headless",
    ] {
        wait_for_resource(&services, name, DEFAULT_WAIT)
            .await
            .unwrap_or_else(|e| panic!("Service {} should be created: {}", name, e));
    }

    assert!(operator.is_running());
    assert_eq!(operator.namespace(), test_ns.name());
    operator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_document_update_scales_kafka() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "kafka-update").await;
    let operator = ScopedOperator::start(client.clone(), test_ns.name()).await;

    let documents: Api<ConfigMap> = test_ns.api();
    let statefulsets: Api<StatefulSet> = test_ns.api();

    create_document(
        &documents,
        &DocumentBuilder::kafka("kafka-ex")
            .namespace(test_ns.name())
            .build(),
    )
    .await;
    wait_for_resource(&statefulsets, "kafka-ex-kafka", DEFAULT_WAIT)
        .await
        .expect("Kafka StatefulSet should be created");

    replace_document(
        &documents,
        DocumentBuilder::kafka("kafka-ex")
            .namespace(test_ns.name())
            .data("kafka-nodes", "4")
            .build(),
    )
    .await;

    wait_for_condition(
        &statefulsets,
        "kafka-ex-kafka",
        |sts| has_statefulset_replicas(sts, 4),
        DEFAULT_WAIT,
    )
    .await
    .expect("Kafka StatefulSet should scale to 4 replicas");

    operator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_document_deletion_removes_cluster() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "kafka-delete").await;
    let operator = ScopedOperator::start(client.clone(), test_ns.name()).await;

    let documents: Api<ConfigMap> = test_ns.api();
    let statefulsets: Api<StatefulSet> = test_ns.api();
    let services: Api<Service> = test_ns.api();

    create_document(
        &documents,
        &DocumentBuilder::kafka("kafka-ex")
            .namespace(test_ns.name())
            .build(),
    )
    .await;
    wait_for_resource(&statefulsets, "kafka-ex-kafka", DEFAULT_WAIT)
        .await
        .expect("Kafka StatefulSet should be created");

    documents
        .delete("kafka-ex", &DeleteParams::default())
        .await
        .expect("Failed to delete cluster document");

    for name in ["kafka-ex-kafka", "kafka-ex-zookeeper"] {
        wait_for_deletion(&statefulsets, name, DEFAULT_WAIT)
            .await
            .unwrap_or_else(|e| panic!("StatefulSet {} should be deleted: {}", name, e));
    }
    wait_for_deletion(&services, "kafka-ex-zookeeper-headless", DEFAULT_WAIT)
        .await
        .expect("ZooKeeper headless Service should be deleted");

    operator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_kafka_connect_lifecycle() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "connect").await;
    let operator = ScopedOperator::start(client.clone(), test_ns.name()).await;

    let documents: Api<ConfigMap> = test_ns.api();
    let deployments: Api<Deployment> = test_ns.api();
    let services: Api<Service> = test_ns.api();

    create_document(
        &documents,
        &DocumentBuilder::kafka_connect("connect-ex")
            .namespace(test_ns.name())
            .data("nodes", "2")
            .build(),
    )
    .await;
    wait_for_condition(
        &deployments,
        "connect-ex-connect",
        |d| has_deployment_replicas(d, 2),
        DEFAULT_WAIT,
    )
    .await
    .expect("Kafka Connect Deployment should be created with 2 replicas");
    wait_for_resource(&services, "connect-ex-connect", DEFAULT_WAIT)
        .await
        .expect("Kafka Connect Service should be created");

    documents
        .delete("connect-ex", &DeleteParams::default())
        .await
        .expect("Failed to delete cluster document");
    wait_for_deletion(&deployments, "connect-ex-connect", DEFAULT_WAIT)
        .await
        .expect("Kafka Connect Deployment should be deleted");

    operator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_restarted_controller_removes_orphans() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "orphans").await;

    let documents: Api<ConfigMap> = test_ns.api();
    let statefulsets: Api<StatefulSet> = test_ns.api();

    let operator = ScopedOperator::start(client.clone(), test_ns.name()).await;
    create_document(
        &documents,
        &DocumentBuilder::kafka("kafka-ex")
            .namespace(test_ns.name())
            .build(),
    )
    .await;
    wait_for_resource(&statefulsets, "kafka-ex-kafka", DEFAULT_WAIT)
        .await
        .expect("Kafka StatefulSet should be created");
    operator.stop().await;

    // Deleted while no controller is watching
    documents
        .delete("kafka-ex", &DeleteParams::default())
        .await
        .expect("Failed to delete cluster document");

    let operator = ScopedOperator::start(client.clone(), test_ns.name()).await;
    wait_for_deletion(&statefulsets, "kafka-ex-kafka", DEFAULT_WAIT)
        .await
        .expect("Startup pass should delete the orphaned cluster");
    operator.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_periodic_pass_repairs_deleted_service() {
    let (_cluster, client) = init_test().await;
    let test_ns = TestNamespace::create(client.clone(), "drift").await;
    let operator = ScopedOperator::start(client.clone(), test_ns.name()).await;

    let documents: Api<ConfigMap> = test_ns.api();
    let services: Api<Service> = test_ns.api();

    create_document(
        &documents,
        &DocumentBuilder::kafka("kafka-ex")
            .namespace(test_ns.name())
            .build(),
    )
    .await;
    wait_for_resource(&services, "kafka-ex-kafka-headless", DEFAULT_WAIT)
        .await
        .expect("Kafka headless Service should be created");

    services
        .delete("kafka-ex-kafka-headless", &DeleteParams::default())
        .await
        .expect("Failed to delete Service");
    wait_for_deletion(&services, "kafka-ex-kafka-headless", DEFAULT_WAIT)
        .await
        .expect("Service should be deleted");

    wait_for_resource(&services, "kafka-ex-kafka-headless", DEFAULT_WAIT)
        .await
        .expect("Periodic pass should recreate the Service");
    assert!(
        operator
            .health()
            .metrics
            .encode()
            .contains("trigger=\"periodic\"")
    );

    operator.stop().await;
}
