// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Integration tests for kafka-cluster-operator
//!
//! These tests require a running Kubernetes cluster accessible via kubeconfig.
//! Tests are marked with #[ignore] and must be run explicitly:
//!
//! ```bash
//! # Run all integration tests (parallel execution supported)
//! cargo test --test integration -- --ignored
//!
//! # Run specific test
//! cargo test --test integration test_kafka_document_creates_cluster -- --ignored
//! ```
//!
//! The tests use your existing kubeconfig (~/.kube/config or KUBECONFIG env var).
//! They check the objects the controller writes; pods are not required to
//! become ready.
//!
//! ## Design Principles
//!
//! - **Parallel Test Execution**: Each test creates its own namespace and scoped
//!   controller, enabling concurrent test runs without interference
//! - **RAII Cleanup**: TestNamespace implements Drop for automatic cleanup even on panic
//! - **Watch-Based Waiting**: Uses kube-rs watches for efficient resource detection

// Shared test fixtures (used by unit, functional, integration, and proptest)
#[path = "../common/mod.rs"]
mod common;

mod wait;

// Test modules
mod cluster_tests;

pub use cluster::*;
pub use namespace::*;
pub use operator::*;
pub use wait::*;

/// Shared cluster connection and a fresh client for one test.
pub async fn init_test() -> (std::sync::Arc<SharedTestCluster>, kube::Client) {
    init_tracing();
    let cluster = SharedTestCluster::get().await;
    let client = cluster.new_client().await;
    (cluster, client)
}
