//! Chain ordering and gating through the executor.

use std::sync::Arc;
use std::time::Duration;

use kafka_cluster_operator::HealthState;
use kafka_cluster_operator::controller::chain::{Chain, ChainKind, ChainProgress, ChainRunner};
use kafka_cluster_operator::controller::error::Error;
use kafka_cluster_operator::controller::executor::OperationExecutor;
use kafka_cluster_operator::controller::operations::Operation;
use kafka_cluster_operator::gateway::{ClusterObject, ObjectKind};
use kafka_cluster_operator::model::{ClusterRole, ClusterType};

use crate::common::{Call, CallKind, DocumentBuilder, InMemoryGateway, TEST_NAMESPACE};

fn runner(gateway: &Arc<InMemoryGateway>) -> ChainRunner {
    let executor = OperationExecutor::new(gateway.clone(), 5, Duration::from_secs(5));
    ChainRunner::new(executor, None)
}

fn chain(kind: ChainKind, cluster_type: ClusterType, name: &str) -> Chain {
    Chain::new(kind, cluster_type, TEST_NAMESPACE, name)
}

fn position(calls: &[Call], call: &Call) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{:?} not in {:?}", call, calls))
}

fn replicas(gateway: &InMemoryGateway, name: &str) -> Option<i32> {
    match gateway.object(TEST_NAMESPACE, ObjectKind::StatefulSet, name)? {
        ClusterObject::StatefulSet(sts) => sts.spec.and_then(|s| s.replicas),
        _ => None,
    }
}

#[tokio::test]
async fn test_add_chain_creates_zookeeper_first() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());

    let progress = runner(&gateway)
        .run(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"))
        .await;

    assert_eq!(progress, ChainProgress::Succeeded);
    assert_eq!(gateway.object_count(), 6);
    let writes = gateway.writes();
    let last_zookeeper = position(
        &writes,
        &Call::Create(ObjectKind::Service, "kafka-ex-zookeeper-headless".to_string()),
    );
    let first_kafka = position(
        &writes,
        &Call::Create(ObjectKind::StatefulSet, "kafka-ex-kafka".to_string()),
    );
    assert!(last_zookeeper < first_kafka);
}

#[tokio::test]
async fn test_add_chain_aborts_when_zookeeper_fails() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());
    gateway.fail(CallKind::Create, Some("kafka-ex-zookeeper"), 1);

    let progress = runner(&gateway)
        .run(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"))
        .await;

    assert_eq!(progress, ChainProgress::Aborted { at_step: 0 });
    assert!(!gateway.has_object(TEST_NAMESPACE, ObjectKind::StatefulSet, "kafka-ex-kafka"));
    assert_eq!(
        gateway.count_calls(|c| matches!(c, Call::Create(_, name) if name.starts_with("kafka-ex-kafka"))),
        0
    );
}

#[tokio::test]
async fn test_add_chain_without_document_aborts() {
    let gateway = Arc::new(InMemoryGateway::new());

    let progress = runner(&gateway)
        .run(chain(ChainKind::Add, ClusterType::Kafka, "gone"))
        .await;

    assert_eq!(progress, ChainProgress::Aborted { at_step: 0 });
    assert!(gateway.writes().is_empty());
}

#[tokio::test]
async fn test_delete_chain_removes_kafka_first() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());
    let runner = runner(&gateway);
    runner
        .run(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"))
        .await;
    gateway.clear_calls();

    let progress = runner
        .run(chain(ChainKind::Delete, ClusterType::Kafka, "kafka-ex"))
        .await;

    assert_eq!(progress, ChainProgress::Succeeded);
    assert_eq!(gateway.object_count(), 0);
    let writes = gateway.writes();
    let last_kafka = position(
        &writes,
        &Call::Delete(ObjectKind::Service, "kafka-ex-kafka-headless".to_string()),
    );
    let first_zookeeper = position(
        &writes,
        &Call::Delete(ObjectKind::StatefulSet, "kafka-ex-zookeeper".to_string()),
    );
    assert!(last_kafka < first_zookeeper);
}

#[tokio::test]
async fn test_delete_chain_keeps_zookeeper_when_kafka_delete_fails() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());
    let runner = runner(&gateway);
    runner
        .run(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"))
        .await;
    gateway.fail(CallKind::Delete, Some("kafka-ex-kafka"), 1);

    let progress = runner
        .run(chain(ChainKind::Delete, ClusterType::Kafka, "kafka-ex"))
        .await;

    assert_eq!(progress, ChainProgress::Aborted { at_step: 0 });
    assert!(gateway.has_object(TEST_NAMESPACE, ObjectKind::StatefulSet, "kafka-ex-zookeeper"));
    assert!(gateway.has_object(TEST_NAMESPACE, ObjectKind::StatefulSet, "kafka-ex-kafka"));
}

#[tokio::test]
async fn test_update_chain_continues_after_zookeeper_failure() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());
    let runner = runner(&gateway);
    runner
        .run(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"))
        .await;

    gateway.put_document(
        DocumentBuilder::kafka("kafka-ex")
            .data("zookeeper-nodes", "5")
            .data("kafka-nodes", "4")
            .build(),
    );
    gateway.fail(CallKind::Patch, Some("kafka-ex-zookeeper"), 1);

    let progress = runner
        .run(chain(ChainKind::Update, ClusterType::Kafka, "kafka-ex"))
        .await;

    assert_eq!(progress, ChainProgress::CompletedWithFailures { failures: 1 });
    assert_eq!(replicas(&gateway, "kafka-ex-zookeeper"), Some(1));
    assert_eq!(replicas(&gateway, "kafka-ex-kafka"), Some(4));

    // The next update converges the ensemble
    let progress = runner
        .run(chain(ChainKind::Update, ClusterType::Kafka, "kafka-ex"))
        .await;
    assert_eq!(progress, ChainProgress::Succeeded);
    assert_eq!(replicas(&gateway, "kafka-ex-zookeeper"), Some(5));
}

#[tokio::test]
async fn test_connect_chains_have_one_step() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka_connect("connect-ex").build());
    let runner = runner(&gateway);

    let progress = runner
        .run(chain(ChainKind::Add, ClusterType::KafkaConnect, "connect-ex"))
        .await;
    assert_eq!(progress, ChainProgress::Succeeded);
    assert!(gateway.has_object(TEST_NAMESPACE, ObjectKind::Deployment, "connect-ex-connect"));

    let progress = runner
        .run(chain(ChainKind::Delete, ClusterType::KafkaConnect, "connect-ex"))
        .await;
    assert_eq!(progress, ChainProgress::Succeeded);
    assert_eq!(gateway.object_count(), 0);
}

#[tokio::test]
async fn test_overlapping_add_chains_converge() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());
    let runner = runner(&gateway);

    let first = runner.spawn(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"));
    let second = runner.spawn(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"));

    assert_eq!(first.await.unwrap(), ChainProgress::Succeeded);
    assert_eq!(second.await.unwrap(), ChainProgress::Succeeded);
    assert_eq!(gateway.object_count(), 6);
}

#[tokio::test]
async fn test_chain_outcome_is_recorded() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka_connect("connect-ex").build());
    let health = Arc::new(HealthState::new());
    let executor = OperationExecutor::new(gateway.clone(), 2, Duration::from_secs(5))
        .with_health_state(Some(health.clone()));
    let runner = ChainRunner::new(executor, Some(health.clone()));

    runner
        .run(chain(ChainKind::Add, ClusterType::KafkaConnect, "connect-ex"))
        .await;

    let encoded = health.metrics.encode();
    assert!(encoded.contains("chain=\"add-kafka-connect\""));
    assert!(encoded.contains("outcome=\"succeeded\""));
    assert!(encoded.contains("operation=\"create-kafka-connect\""));
}

#[tokio::test]
async fn test_operation_outcome_distinguishes_rejected_documents() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(
        DocumentBuilder::kafka("bad")
            .data("kafka-nodes", "three")
            .build(),
    );
    gateway.put_document(DocumentBuilder::kafka_connect("flaky").build());
    gateway.fail(CallKind::Create, None, 1);
    let health = Arc::new(HealthState::new());
    let executor = OperationExecutor::new(gateway.clone(), 2, Duration::from_secs(5))
        .with_health_state(Some(health.clone()));

    let rejected = executor
        .run(Operation::create(ClusterRole::Kafka, TEST_NAMESPACE, "bad"))
        .await
        .unwrap_err();
    let failed = executor
        .run(Operation::create(ClusterRole::KafkaConnect, TEST_NAMESPACE, "flaky"))
        .await
        .unwrap_err();

    assert!(!rejected.is_retryable());
    assert!(failed.is_retryable());
    let encoded = health.metrics.encode();
    assert!(encoded.contains(
        "kafkaoperator_operations_total{operation=\"create-kafka\",outcome=\"rejected\"} 1"
    ));
    assert!(encoded.contains(
        "kafkaoperator_operations_total{operation=\"create-kafka-connect\",outcome=\"failure\"} 1"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_executor_times_out_stalled_operation() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());
    gateway.delay_creates(Duration::from_secs(60));
    let executor = OperationExecutor::new(gateway.clone(), 1, Duration::from_secs(1));

    let err = executor
        .run(Operation::create(ClusterRole::Zookeeper, TEST_NAMESPACE, "kafka-ex"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(!gateway.has_object(TEST_NAMESPACE, ObjectKind::StatefulSet, "kafka-ex-zookeeper"));

    // The next operation waits for the stalled task to release the slot
    let started = tokio::time::Instant::now();
    let err = executor
        .run(Operation::create(ClusterRole::Kafka, TEST_NAMESPACE, "kafka-ex"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(started.elapsed() >= Duration::from_secs(59));
    assert!(gateway.has_object(TEST_NAMESPACE, ObjectKind::StatefulSet, "kafka-ex-zookeeper"));
}

#[tokio::test(start_paused = true)]
async fn test_queued_operations_share_slot_without_timing_out() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka_connect("a").build());
    gateway.put_document(DocumentBuilder::kafka_connect("b").build());
    // Two creates per operation: 0.8s of work under a 1s timeout
    gateway.delay_creates(Duration::from_millis(400));
    let executor = OperationExecutor::new(gateway.clone(), 1, Duration::from_secs(1));

    let (a, b) = tokio::join!(
        executor.run(Operation::create(ClusterRole::KafkaConnect, TEST_NAMESPACE, "a")),
        executor.run(Operation::create(ClusterRole::KafkaConnect, TEST_NAMESPACE, "b")),
    );

    a.unwrap();
    b.unwrap();
    assert!(gateway.has_object(TEST_NAMESPACE, ObjectKind::Deployment, "a-connect"));
    assert!(gateway.has_object(TEST_NAMESPACE, ObjectKind::Deployment, "b-connect"));
}

#[tokio::test(start_paused = true)]
async fn test_add_chain_aborts_on_timeout() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.put_document(DocumentBuilder::kafka("kafka-ex").build());
    gateway.delay_creates(Duration::from_secs(60));
    let executor = OperationExecutor::new(gateway.clone(), 5, Duration::from_secs(1));

    let progress = ChainRunner::new(executor, None)
        .run(chain(ChainKind::Add, ClusterType::Kafka, "kafka-ex"))
        .await;

    assert_eq!(progress, ChainProgress::Aborted { at_step: 0 });
}

#[tokio::test]
async fn test_execute_reports_result_to_callback() {
    let gateway = Arc::new(InMemoryGateway::new());
    let executor = OperationExecutor::new(gateway.clone(), 1, Duration::from_secs(5));
    let (tx, rx) = tokio::sync::oneshot::channel();

    executor
        .execute(
            Operation::create(ClusterRole::Kafka, TEST_NAMESPACE, "missing"),
            move |result| {
                let _ = tx.send(result);
            },
        )
        .await
        .unwrap();

    let result = rx.await.unwrap();
    assert!(matches!(result, Err(Error::MissingDocument { .. })));
}
