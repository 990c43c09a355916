//! Clustered migration dependency graph
//!
//! Uses `petgraph::StableGraph` for storage, plus a key → index map so that
//! inserting a migration that is already present returns the existing node
//! instead of adding a second one.
//!
//! On top of the flat graph, every node and edge belongs to exactly one
//! [`Cluster`], keyed by component name:
//! - a node lives in the cluster of its own component
//! - an edge `from -> to` lives in the cluster of `to`, so a cross-component
//!   dependency is drawn entering the dependency's own cluster
//!
//! Edges are not deduplicated: recording the same dependency twice stores
//! two edges.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

use crate::migration::MigrationId;

/// A migration in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationNode {
    /// Identity of the migration
    pub id: MigrationId,
    /// Unique node key, `component__name`
    pub key: String,
    /// Visible label (the bare migration name)
    pub label: String,
}

impl MigrationNode {
    pub fn new(id: MigrationId) -> Self {
        Self {
            key: id.node_key(),
            label: id.name.clone(),
            id,
        }
    }
}

/// "depends on" relation, weight of every graph edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Component whose cluster owns the edge (the target's)
    pub cluster: String,
}

/// All nodes and edges of one component
#[derive(Debug, Clone)]
pub struct Cluster {
    name: String,
    label: String,
    nodes: Vec<NodeIndex>,
    edges: Vec<EdgeIndex>,
}

impl Cluster {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable label, the component name
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// The project-wide migration graph
///
/// Built in one pass and handed to an exporter; there is no removal.
#[derive(Debug, Clone, Default)]
pub struct ProjectGraph {
    inner: StableGraph<MigrationNode, DependencyEdge>,
    node_id_map: HashMap<String, NodeIndex>,
    /// Sorted by component so output order never depends on walk order
    clusters: BTreeMap<String, Cluster>,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a node exists for `id` inside its component's cluster
    ///
    /// Idempotent: returns the existing index when `id` was seen before.
    pub fn record_migration(&mut self, id: &MigrationId) -> NodeIndex {
        let key = id.node_key();
        if let Some(&index) = self.node_id_map.get(&key) {
            return index;
        }

        trace!("Adding node {} to cluster {}", key, id.component);
        let index = self.inner.add_node(MigrationNode::new(id.clone()));
        self.node_id_map.insert(key, index);
        self.cluster_entry(&id.component).nodes.push(index);
        index
    }

    /// Record that `from` depends on `to`
    ///
    /// Creates both endpoint nodes (and their clusters) on first reference,
    /// then adds the edge to the cluster of `to`. Repeated calls add
    /// repeated edges.
    pub fn record_dependency(&mut self, from: &MigrationId, to: &MigrationId) -> EdgeIndex {
        trace!("Adding edge from {} to {}", from, to);

        let from_index = self.record_migration(from);
        let to_index = self.record_migration(to);

        let edge = self.inner.add_edge(
            from_index,
            to_index,
            DependencyEdge {
                cluster: to.component.clone(),
            },
        );
        self.cluster_entry(&to.component).edges.push(edge);
        edge
    }

    fn cluster_entry(&mut self, component: &str) -> &mut Cluster {
        self.clusters
            .entry(component.to_string())
            .or_insert_with(|| Cluster::new(component))
    }

    /// Look up a cluster by component name
    pub fn cluster(&self, component: &str) -> Option<&Cluster> {
        self.clusters.get(component)
    }

    /// Clusters in component-name order
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Nodes of a cluster, in insertion order
    pub fn cluster_nodes<'a>(&'a self, cluster: &'a Cluster) -> impl Iterator<Item = &'a MigrationNode> + 'a {
        cluster
            .nodes
            .iter()
            .filter_map(move |&index| self.inner.node_weight(index))
    }

    /// Edges attached to a cluster as (from, to) node pairs, in insertion order
    pub fn cluster_edges<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> impl Iterator<Item = (&'a MigrationNode, &'a MigrationNode)> + 'a {
        cluster.edges.iter().filter_map(move |&edge| {
            let (from, to) = self.inner.edge_endpoints(edge)?;
            Some((self.inner.node_weight(from)?, self.inner.node_weight(to)?))
        })
    }

    /// All edges as (from, to) identities, cluster by cluster
    pub fn edges(&self) -> impl Iterator<Item = (&MigrationId, &MigrationId)> {
        self.clusters()
            .flat_map(move |cluster| self.cluster_edges(cluster))
            .map(|(from, to)| (&from.id, &to.id))
    }

    /// Node for a migration, if it has been recorded
    pub fn node(&self, id: &MigrationId) -> Option<&MigrationNode> {
        self.node_id_map
            .get(&id.node_key())
            .and_then(|&index| self.inner.node_weight(index))
    }

    pub fn contains(&self, id: &MigrationId) -> bool {
        self.node_id_map.contains_key(&id.node_key())
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }
}
