//! kafka-cluster-operator library crate
//!
//! Reconciles ZooKeeper + Kafka cluster pairs and Kafka Connect clusters
//! declared as labeled ConfigMaps. The binary wires these modules together;
//! tests drive [`ClusterController`] through an in-memory
//! [`ClusterGateway`](gateway::ClusterGateway).

pub mod config;
pub mod controller;
pub mod gateway;
pub mod health;
pub mod labels;
pub mod model;
pub mod resources;

pub use config::OperatorConfig;
pub use controller::{ClusterController, ControllerConfig};
pub use gateway::KubeGateway;
pub use health::HealthState;
pub use labels::LabelPredicate;
