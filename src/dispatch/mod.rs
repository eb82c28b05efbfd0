//! Worker-dispatch boundary.
//!
//! The model-serving cluster is an external collaborator. This module only
//! describes what the queue needs from it ([`Cluster`]), how to pick a node
//! ([`select_by_affinity`]), and the worker loop that drains the queue into
//! it ([`WorkerPool`]).

pub mod affinity;
pub mod worker;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::WorkItem;

pub use affinity::select_by_affinity;
pub use worker::{WorkerConfig, WorkerPool};

/// Identifies a serving node, e.g. `"10.0.0.5:1234"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Available,
    Busy,
    Loading,
    Offline,
}

/// Result of probing one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub healthy: bool,
    pub latency: Option<Duration>,
    pub loaded_models: Vec<String>,
    pub error: Option<String>,
}

/// What the selector needs to know about a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub status: NodeStatus,
    pub loaded_models: Vec<String>,
    pub in_flight: usize,
    /// Free memory in GB.
    pub available_memory: f64,
}

impl NodeSnapshot {
    /// Anything not offline can take work.
    pub fn is_healthy(&self) -> bool {
        self.status != NodeStatus::Offline
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.loaded_models.iter().any(|m| m == model)
    }
}

/// What a node said about one dispatched item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub success: bool,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn ok(response: serde_json::Value) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }
}

/// The model-serving cluster as seen by workers.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Current view of every known node.
    async fn nodes(&self) -> Vec<NodeSnapshot>;

    async fn health(&self, node: &NodeId) -> Result<NodeHealth>;

    async fn loaded_models(&self, node: &NodeId) -> Result<Vec<String>>;

    /// Pick a node for `model`. Defaults to [`select_by_affinity`] over
    /// [`nodes`](Self::nodes).
    async fn select_node(&self, model: Option<&str>) -> Option<NodeId> {
        let nodes = self.nodes().await;
        select_by_affinity(&nodes, model).map(|n| n.id.clone())
    }

    /// Load `model` on `node`, making room first if the node needs it.
    async fn load_model(&self, node: &NodeId, model: &str) -> Result<()>;

    async fn unload_model(&self, node: &NodeId, model: &str) -> Result<()>;

    async fn dispatch(&self, node: &NodeId, item: &WorkItem) -> Result<DispatchOutcome>;
}

/// Load `model` on `node` unless it is already there.
pub async fn ensure_model_loaded(cluster: &dyn Cluster, node: &NodeId, model: &str) -> Result<()> {
    let loaded = cluster.loaded_models(node).await?;
    if loaded.iter().any(|m| m == model) {
        debug!(%node, model, "model already loaded");
        return Ok(());
    }
    info!(%node, model, "loading model");
    cluster.load_model(node, model).await
}
