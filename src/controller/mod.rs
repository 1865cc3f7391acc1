//! Controller module for kafka-cluster-operator.
//!
//! Contains the event loop, reconciliation passes, operation chains and
//! the bounded executor that runs cluster lifecycle operations.
//!
//! ## Architecture
//!
//! - `lifecycle`: [`ClusterController`] start/stop and the event loop
//! - `dispatcher`: classify watch notifications
//! - `reconciler`: compare documents with live workloads per family
//! - `chain`: ordered operation chains as explicit state machines
//! - `operations`: the nine create/update/delete operations
//! - `executor`: bounded pool with per-operation timeout

pub mod chain;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod operations;
pub mod reconciler;

pub use context::{Context, ControllerConfig};
pub use lifecycle::ClusterController;
