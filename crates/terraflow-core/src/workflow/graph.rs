//! DAG builder, cycle detection, and deterministic topological ordering.
//!
//! Uses `petgraph` to model node dependencies as a directed graph. Topological
//! sort detects cycles; the execution order itself is computed with an
//! explicit Kahn queue that breaks ties by node declaration order, so the same
//! version always yields the same sequence.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use terraflow_types::workflow::{WorkflowEdge, WorkflowNode, WorkflowVersion};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Structural problems that make a version unexecutable.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("workflow version has no nodes")]
    Empty,

    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),

    #[error("cycle detected involving node '{0}'")]
    Cycle(String),
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Validated adjacency view over one workflow version.
///
/// Construction rejects empty versions, duplicate node ids, dangling edge
/// endpoints, and cycles. The borrowed version must outlive the graph.
pub struct WorkflowGraph<'a> {
    nodes: &'a [WorkflowNode],
    edges: &'a [WorkflowEdge],
    /// Node id -> declaration index.
    index: HashMap<&'a str, usize>,
    graph: DiGraph<usize, ()>,
    petgraph_index: Vec<NodeIndex>,
}

impl<'a> WorkflowGraph<'a> {
    /// Build and validate the graph for a version.
    pub fn build(version: &'a WorkflowVersion) -> Result<Self, GraphError> {
        let nodes = &version.nodes;
        let edges = &version.edges;

        if nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        // Edge from source -> target
        let mut graph = DiGraph::<usize, ()>::new();
        let petgraph_index: Vec<_> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

        for edge in edges {
            let from = *index
                .get(edge.source.as_str())
                .ok_or_else(|| GraphError::UnknownNode(edge.source.clone()))?;
            let to = *index
                .get(edge.target.as_str())
                .ok_or_else(|| GraphError::UnknownNode(edge.target.clone()))?;
            graph.add_edge(petgraph_index[from], petgraph_index[to], ());
        }

        // Topological sort -- detects cycles
        toposort(&graph, None).map_err(|cycle| {
            let decl = graph[cycle.node_id()];
            GraphError::Cycle(nodes[decl].id.clone())
        })?;

        Ok(Self {
            nodes,
            edges,
            index,
            graph,
            petgraph_index,
        })
    }

    /// Execution order: Kahn's algorithm with declaration-order tie-break.
    ///
    /// Among all nodes whose dependencies are satisfied, the one declared
    /// first in the version is dequeued next. Cycles were rejected at build
    /// time, so every node appears exactly once.
    pub fn topological_order(&self) -> Vec<&'a WorkflowNode> {
        let mut in_degree: Vec<usize> = self
            .petgraph_index
            .iter()
            .map(|&ix| {
                self.graph
                    .neighbors_directed(ix, petgraph::Direction::Incoming)
                    .count()
            })
            .collect();

        // Ready set keyed by declaration index; BTreeSet pops the smallest.
        let mut ready: std::collections::BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(&decl) = ready.iter().next() {
            ready.remove(&decl);
            order.push(&self.nodes[decl]);

            for succ in self
                .graph
                .neighbors_directed(self.petgraph_index[decl], petgraph::Direction::Outgoing)
            {
                let succ_decl = self.graph[succ];
                in_degree[succ_decl] -= 1;
                if in_degree[succ_decl] == 0 {
                    ready.insert(succ_decl);
                }
            }
        }

        order
    }

    /// Edges pointing into the given node.
    pub fn incoming<'b>(
        &'b self,
        node_id: &'b str,
    ) -> impl Iterator<Item = &'a WorkflowEdge> + 'b {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Whether the node has any incoming edges at all.
    pub fn is_root(&self, node_id: &str) -> bool {
        !self.edges.iter().any(|e| e.target == node_id)
    }

    /// Look up a node by id.
    pub fn node(&self, node_id: &str) -> Option<&'a WorkflowNode> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;
    use terraflow_types::workflow::NodeKind;

    fn node(id: &str, kind: NodeKind) -> WorkflowNode {
        WorkflowNode::new(id, kind, Map::new())
    }

    fn version(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> WorkflowVersion {
        WorkflowVersion {
            version: "1.0.0".to_string(),
            nodes,
            edges,
            changelog: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn order_ids(version: &WorkflowVersion) -> Vec<String> {
        WorkflowGraph::build(version)
            .unwrap()
            .topological_order()
            .iter()
            .map(|n| n.id.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn test_linear_chain_order() {
        let v = version(
            vec![
                node("a", NodeKind::Trigger),
                node("b", NodeKind::Processing),
                node("c", NodeKind::Output),
            ],
            vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "c")],
        );
        assert_eq!(order_ids(&v), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let v = version(
            vec![
                node("third", NodeKind::Trigger),
                node("first", NodeKind::Trigger),
                node("second", NodeKind::Trigger),
            ],
            vec![],
        );
        // no edges: declaration order is the tie-break
        assert_eq!(order_ids(&v), vec!["third", "first", "second"]);
    }

    #[test]
    fn test_diamond_deterministic() {
        // a -> {b, c} -> d, with c declared before b
        let v = version(
            vec![
                node("a", NodeKind::Trigger),
                node("c", NodeKind::Processing),
                node("b", NodeKind::Processing),
                node("d", NodeKind::Output),
            ],
            vec![
                WorkflowEdge::new("a", "b"),
                WorkflowEdge::new("a", "c"),
                WorkflowEdge::new("b", "d"),
                WorkflowEdge::new("c", "d"),
            ],
        );
        assert_eq!(order_ids(&v), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_order_is_stable_across_calls() {
        let v = version(
            vec![
                node("a", NodeKind::Trigger),
                node("b", NodeKind::Processing),
                node("c", NodeKind::Processing),
                node("d", NodeKind::Output),
            ],
            vec![
                WorkflowEdge::new("a", "b"),
                WorkflowEdge::new("a", "c"),
                WorkflowEdge::new("b", "d"),
                WorkflowEdge::new("c", "d"),
            ],
        );
        let first = order_ids(&v);
        for _ in 0..10 {
            assert_eq!(order_ids(&v), first);
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_empty_version_rejected() {
        let v = version(vec![], vec![]);
        assert!(matches!(
            WorkflowGraph::build(&v).err().unwrap(),
            GraphError::Empty
        ));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let v = version(
            vec![node("a", NodeKind::Trigger), node("a", NodeKind::Output)],
            vec![],
        );
        assert!(matches!(
            WorkflowGraph::build(&v).err().unwrap(),
            GraphError::DuplicateNode(id) if id == "a"
        ));
    }

    #[test]
    fn test_unknown_edge_endpoint_rejected() {
        let v = version(
            vec![node("a", NodeKind::Trigger)],
            vec![WorkflowEdge::new("a", "missing")],
        );
        assert!(matches!(
            WorkflowGraph::build(&v).err().unwrap(),
            GraphError::UnknownNode(id) if id == "missing"
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let v = version(
            vec![
                node("a", NodeKind::Processing),
                node("b", NodeKind::Processing),
            ],
            vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "a")],
        );
        let err = WorkflowGraph::build(&v).err().unwrap();
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn test_self_loop_rejected() {
        let v = version(
            vec![node("a", NodeKind::Processing)],
            vec![WorkflowEdge::new("a", "a")],
        );
        assert!(matches!(
            WorkflowGraph::build(&v).err().unwrap(),
            GraphError::Cycle(_)
        ));
    }

    // -----------------------------------------------------------------------
    // Adjacency helpers
    // -----------------------------------------------------------------------

    #[test]
    fn test_incoming_edges() {
        let v = version(
            vec![
                node("a", NodeKind::Trigger),
                node("b", NodeKind::Processing),
                node("c", NodeKind::Output),
            ],
            vec![WorkflowEdge::new("a", "c"), WorkflowEdge::new("b", "c")],
        );
        let graph = WorkflowGraph::build(&v).unwrap();
        let sources: Vec<&str> = graph.incoming("c").map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "b"]);
        assert!(graph.is_root("a"));
        assert!(!graph.is_root("c"));
    }
}
