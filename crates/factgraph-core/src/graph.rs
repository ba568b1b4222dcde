//! # Graph Builder
//!
//! Usage and dependency reads over the aggregated edge index, plus bounded
//! traversal from a root component.
//!
//! ## Traversal Bounds
//!
//! - `depth` is clamped to `GraphLimits::max_depth`
//! - Every node is expanded at most once, so cycles terminate
//! - At most `GraphLimits::max_edges_explored` edges are examined; a walk
//!   that hits the budget is returned with `truncated = true`
//!
//! ## Hierarchical View
//!
//! Single parent wins: a node hangs under the first parent that discovers
//! it, in breadth-first order, at its shallowest depth. A node reachable
//! through several parents appears once in the tree; every link into it is
//! still present in the node-link view.

use crate::primitives::{
    DEFAULT_GRAPH_DEPTH, DEFAULT_MAX_DEPTH, DEFAULT_MAX_EDGES_EXPLORED, MAX_EDGES_EXPLORED,
    MAX_TRAVERSAL_DEPTH, clamp_limit,
};
use crate::storage::RelationshipBackend;
use crate::{ComponentRef, EdgeSummary, FactgraphError, Retrieval};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// OPTIONS
// =============================================================================

/// Tunable traversal bounds, never above the hard caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLimits {
    pub max_depth: usize,
    pub max_edges_explored: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_edges_explored: DEFAULT_MAX_EDGES_EXPLORED,
        }
    }
}

impl GraphLimits {
    /// Build limits clamped into `1..=` the hard caps.
    #[must_use]
    pub fn new(max_depth: usize, max_edges_explored: usize) -> Self {
        Self {
            max_depth: max_depth.clamp(1, MAX_TRAVERSAL_DEPTH),
            max_edges_explored: max_edges_explored.clamp(1, MAX_EDGES_EXPLORED),
        }
    }
}

/// Output shape of `build_graph`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraphFormat {
    #[default]
    NodesLinks,
    Hierarchical,
}

impl FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nodes-links" | "nodes_links" => Ok(Self::NodesLinks),
            "hierarchical" | "tree" => Ok(Self::Hierarchical),
            other => Err(format!(
                "unknown graph format '{}' (expected nodes-links or hierarchical)",
                other
            )),
        }
    }
}

/// Which edges a traversal follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// What the root depends on.
    #[default]
    Outbound,
    /// What uses the root.
    Inbound,
    Both,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outbound" | "dependencies" => Ok(Self::Outbound),
            "inbound" | "usages" => Ok(Self::Inbound),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown direction '{}' (expected outbound, inbound or both)",
                other
            )),
        }
    }
}

/// Filters for `find_usages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageQuery {
    pub limit: Option<usize>,
    pub relationship_type: Option<String>,
    /// Keep only edges with at least one successful occurrence.
    pub success_only: bool,
}

/// Filters for `find_dependencies`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyQuery {
    pub limit: Option<usize>,
    pub relationship_type: Option<String>,
}

/// Options for `build_graph`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Hops from the root; `None` means `DEFAULT_GRAPH_DEPTH`.
    pub depth: Option<usize>,
    pub format: GraphFormat,
    pub direction: Direction,
}

// =============================================================================
// OUTPUT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// `type:id`
    pub id: String,
    pub component_type: String,
    pub component_id: String,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub relationship_type: String,
    /// Hop at which the link was discovered.
    pub depth: usize,
    pub usage_count: u64,
    pub success_rate_bps: u32,
}

/// Flat node set plus edge list, for force-directed layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLinkGraph {
    pub root: String,
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
    pub truncated: bool,
}

/// One node of the hierarchical view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: String,
    pub component_type: String,
    pub component_id: String,
    /// The edge from the parent; `None` at the root.
    pub relationship_type: Option<String>,
    pub usage_count: Option<u64>,
    pub children: Vec<HierarchyNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum GraphOutput {
    NodesLinks(NodeLinkGraph),
    Hierarchical { tree: HierarchyNode, truncated: bool },
}

impl GraphOutput {
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        match self {
            Self::NodesLinks(g) => g.truncated,
            Self::Hierarchical { truncated, .. } => *truncated,
        }
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Everything a bounded walk discovered.
#[derive(Debug)]
struct Walk {
    root: ComponentRef,
    /// Discovery order, root first.
    order: Vec<ComponentRef>,
    depth_of: BTreeMap<ComponentRef, usize>,
    /// First discoverer of each non-root node, with the edge used.
    parent: BTreeMap<ComponentRef, (ComponentRef, EdgeSummary)>,
    links: Vec<GraphLink>,
    truncated: bool,
    failure: Option<String>,
}

impl Walk {
    fn new(root: &ComponentRef) -> Self {
        let mut depth_of = BTreeMap::new();
        depth_of.insert(root.clone(), 0);
        Self {
            root: root.clone(),
            order: vec![root.clone()],
            depth_of,
            parent: BTreeMap::new(),
            links: Vec::new(),
            truncated: false,
            failure: None,
        }
    }

    fn node_links(self) -> NodeLinkGraph {
        let nodes = self
            .order
            .iter()
            .map(|c| GraphNode {
                id: c.to_string(),
                component_type: c.component_type().to_string(),
                component_id: c.component_id().to_string(),
                depth: self.depth_of.get(c).copied().unwrap_or(0),
            })
            .collect();
        NodeLinkGraph {
            root: self.root.to_string(),
            nodes,
            links: self.links,
            truncated: self.truncated,
        }
    }

    fn hierarchy(&self) -> HierarchyNode {
        let mut children: BTreeMap<&ComponentRef, Vec<&ComponentRef>> = BTreeMap::new();
        for node in &self.order {
            if let Some((parent, _)) = self.parent.get(node) {
                children.entry(parent).or_default().push(node);
            }
        }
        self.subtree(&self.root, &children)
    }

    fn subtree(
        &self,
        node: &ComponentRef,
        children: &BTreeMap<&ComponentRef, Vec<&ComponentRef>>,
    ) -> HierarchyNode {
        let via = self.parent.get(node).map(|(_, edge)| edge);
        HierarchyNode {
            id: node.to_string(),
            component_type: node.component_type().to_string(),
            component_id: node.component_id().to_string(),
            relationship_type: via.map(|e| e.relationship_type.clone()),
            usage_count: via.map(|e| e.usage_count),
            children: children
                .get(node)
                .into_iter()
                .flatten()
                .map(|child| self.subtree(child, children))
                .collect(),
        }
    }
}

fn link(edge: &EdgeSummary, depth: usize) -> GraphLink {
    GraphLink {
        source: edge.source.to_string(),
        target: edge.target.to_string(),
        relationship_type: edge.relationship_type.clone(),
        depth,
        usage_count: edge.usage_count,
        success_rate_bps: edge.success_rate_bps(),
    }
}

/// Usage/dependency reads and bounded traversal over a relationship backend.
pub struct GraphBuilder {
    backend: Arc<dyn RelationshipBackend>,
    limits: GraphLimits,
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new(backend: Arc<dyn RelationshipBackend>, limits: GraphLimits) -> Self {
        Self { backend, limits }
    }

    #[must_use]
    pub fn limits(&self) -> GraphLimits {
        self.limits
    }

    /// Inbound edges: who uses `target`. Most used first.
    pub fn find_usages(
        &self,
        target: &ComponentRef,
        query: &UsageQuery,
    ) -> Retrieval<Vec<EdgeSummary>> {
        Retrieval::from_backend(self.backend.usages(target, None), "find_usages").map(|edges| {
            let mut edges: Vec<EdgeSummary> = edges
                .into_iter()
                .filter(|e| {
                    query
                        .relationship_type
                        .as_ref()
                        .is_none_or(|t| e.relationship_type == *t)
                })
                .filter(|e| !query.success_only || e.success_count > 0)
                .collect();
            edges.sort_by(|a, b| {
                b.usage_count
                    .cmp(&a.usage_count)
                    .then_with(|| a.source.cmp(&b.source))
                    .then_with(|| a.relationship_type.cmp(&b.relationship_type))
            });
            edges.truncate(clamp_limit(query.limit));
            edges
        })
    }

    /// Outbound edges: what `source` depends on. Most used first.
    pub fn find_dependencies(
        &self,
        source: &ComponentRef,
        query: &DependencyQuery,
    ) -> Retrieval<Vec<EdgeSummary>> {
        Retrieval::from_backend(self.backend.dependencies(source, None), "find_dependencies").map(
            |edges| {
                let mut edges: Vec<EdgeSummary> = edges
                    .into_iter()
                    .filter(|e| {
                        query
                            .relationship_type
                            .as_ref()
                            .is_none_or(|t| e.relationship_type == *t)
                    })
                    .collect();
                edges.sort_by(|a, b| {
                    b.usage_count
                        .cmp(&a.usage_count)
                        .then_with(|| a.target.cmp(&b.target))
                        .then_with(|| a.relationship_type.cmp(&b.relationship_type))
                });
                edges.truncate(clamp_limit(query.limit));
                edges
            },
        )
    }

    /// Registered components of `component_type` with no edge in either direction.
    pub fn find_orphans(&self, component_type: &str) -> Retrieval<Vec<ComponentRef>> {
        let result = self.backend.components(component_type).and_then(|components| {
            let used: BTreeSet<ComponentRef> = self
                .backend
                .all_usage_stats(Some(component_type))?
                .into_iter()
                .filter(|s| !s.is_orphan())
                .map(|s| s.component)
                .collect();
            Ok(components
                .into_iter()
                .filter(|c| !used.contains(c))
                .collect())
        });
        Retrieval::from_backend(result, "find_orphans")
    }

    /// Edges leaving `node` in `direction`, each paired with the far end.
    /// At most `budget` edges are read per side.
    fn neighbours(
        &self,
        node: &ComponentRef,
        direction: Direction,
        budget: usize,
    ) -> Result<Vec<(EdgeSummary, ComponentRef)>, FactgraphError> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Outbound | Direction::Both) {
            for edge in self.backend.dependencies(node, Some(budget))? {
                let next = edge.target.clone();
                out.push((edge, next));
            }
        }
        if matches!(direction, Direction::Inbound | Direction::Both) {
            for edge in self.backend.usages(node, Some(budget))? {
                let next = edge.source.clone();
                out.push((edge, next));
            }
        }
        Ok(out)
    }

    fn walk(&self, root: &ComponentRef, depth: usize, direction: Direction) -> Walk {
        let mut walk = Walk::new(root);
        let mut queue = VecDeque::from([(root.clone(), 0usize)]);
        let mut seen_links: BTreeSet<(ComponentRef, ComponentRef, String)> = BTreeSet::new();
        let mut explored = 0usize;

        'bfs: while let Some((node, hop)) = queue.pop_front() {
            if hop >= depth {
                continue;
            }
            // One edge past the remaining budget is enough to detect truncation.
            let budget = self
                .limits
                .max_edges_explored
                .saturating_sub(explored)
                .saturating_add(1);
            let edges = match self.neighbours(&node, direction, budget) {
                Ok(edges) => edges,
                Err(e) => {
                    tracing::warn!(node = %node, error = %e, "graph walk stopped early");
                    walk.failure = Some(e.to_string());
                    break;
                }
            };

            for (edge, next) in edges {
                if explored >= self.limits.max_edges_explored {
                    walk.truncated = true;
                    break 'bfs;
                }
                explored = explored.saturating_add(1);
                let next_hop = hop.saturating_add(1);

                let key = (
                    edge.source.clone(),
                    edge.target.clone(),
                    edge.relationship_type.clone(),
                );
                if seen_links.insert(key) {
                    walk.links.push(link(&edge, next_hop));
                }
                if !walk.depth_of.contains_key(&next) {
                    walk.depth_of.insert(next.clone(), next_hop);
                    walk.order.push(next.clone());
                    walk.parent.insert(next.clone(), (node.clone(), edge));
                    queue.push_back((next, next_hop));
                }
            }
        }

        if walk.truncated {
            tracing::info!(
                root = %root,
                explored,
                budget = self.limits.max_edges_explored,
                "graph walk truncated by edge budget"
            );
        }
        walk
    }

    /// Bounded breadth-first traversal from `root`.
    pub fn build_graph(
        &self,
        root: &ComponentRef,
        options: &GraphOptions,
    ) -> Retrieval<GraphOutput> {
        let depth = options
            .depth
            .unwrap_or(DEFAULT_GRAPH_DEPTH)
            .min(self.limits.max_depth);
        let mut walk = self.walk(root, depth, options.direction);
        let failure = walk.failure.take();

        let output = match options.format {
            GraphFormat::NodesLinks => GraphOutput::NodesLinks(walk.node_links()),
            GraphFormat::Hierarchical => GraphOutput::Hierarchical {
                tree: walk.hierarchy(),
                truncated: walk.truncated,
            },
        };

        match failure {
            None => Retrieval::Confirmed(output),
            Some(reason) => Retrieval::Degraded {
                value: output,
                reason,
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
