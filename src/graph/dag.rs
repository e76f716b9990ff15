//! Dependency Graph
//!
//! Directed node / edge container mirroring the declared commands. Edges are
//! explicit dependencies added by the builder; subgraph flags constrain how
//! the scheduler may move the node relative to its neighbors. Transition
//! pseudo-nodes synthesized during compilation take ids past the command
//! range and never appear here.

use bitflags::bitflags;

use crate::errors::{GraphError, Result};
use crate::graph::node::NodeId;
use crate::utils::ArenaVec;

bitflags! {
    /// Bitflags constraining scheduling of a node.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct SubgraphFlags: u32 {
        /// The enclosing subgraph executes atomically with respect to
        /// external nodes: no external node may be interleaved into it.
        const ATOMIC = 1 << 0;
        /// The enclosing subgraph preserves the local declaration order of
        /// its members.
        const SEQUENTIAL = 1 << 1;
    }
}

/// One graph node: scheduling constraints plus adjacency.
#[derive(Clone, Debug, Default)]
pub struct DagNode {
    /// Subgraph constraint flags inherited from the enclosing subgraph.
    pub subgraph_flags: SubgraphFlags,
    /// Id of the enclosing subgraph, if any.
    pub subgraph_id: Option<u32>,
    /// Incoming edge count (dependencies).
    in_degree: u32,
    /// Outgoing edges (dependents).
    successors: Vec<NodeId>,
}

impl DagNode {
    /// The node's dependents.
    #[must_use]
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }
}

/// Directed dependency graph over the declared commands.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: ArenaVec<DagNode>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the graph, keeping capacity.
    pub fn reset(&mut self) {
        self.nodes.reset();
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Appends a node, returning its id.
    pub fn add_node(&mut self, subgraph_flags: SubgraphFlags, subgraph_id: Option<u32>) -> NodeId {
        self.nodes.push(DagNode {
            subgraph_flags,
            subgraph_id,
            in_degree: 0,
            successors: Vec::new(),
        })
    }

    /// Adds a dependency edge: `from` must execute before `to`.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from as usize >= self.nodes.len() {
            return Err(GraphError::IndexOutOfBounds {
                context: "dependency edge source",
                index: from as usize,
            });
        }
        if to as usize >= self.nodes.len() {
            return Err(GraphError::IndexOutOfBounds {
                context: "dependency edge target",
                index: to as usize,
            });
        }
        if from == to {
            return Err(GraphError::InvalidProgram);
        }

        self.nodes[from].successors.push(to);
        self.nodes[to].in_degree += 1;
        Ok(())
    }

    /// The node record for `id`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &DagNode {
        &self.nodes[id]
    }

    /// Computes a deterministic topological order.
    ///
    /// Kahn's algorithm with an insertion-order ready list: among nodes whose
    /// dependencies are satisfied, the lowest id (declaration order) goes
    /// first. Identical inputs therefore always produce identical orders.
    /// A cycle yields `invalid-program`.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let count = self.nodes.len();
        let mut in_degrees: Vec<u32> = self.nodes.iter().map(|n| n.in_degree).collect();

        // Sorted ready set; scheduling picks the smallest ready id.
        let mut ready: std::collections::BinaryHeap<std::cmp::Reverse<NodeId>> = in_degrees
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(id, _)| std::cmp::Reverse(id as NodeId))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(std::cmp::Reverse(id)) = ready.pop() {
            order.push(id);
            for &succ in &self.nodes[id].successors {
                in_degrees[succ as usize] -= 1;
                if in_degrees[succ as usize] == 0 {
                    ready.push(std::cmp::Reverse(succ));
                }
            }
        }

        if order.len() != count {
            log::error!(
                "dependency cycle detected: {} of {count} nodes schedulable",
                order.len()
            );
            return Err(GraphError::InvalidProgram);
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_nodes(count: u32) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for _ in 0..count {
            graph.add_node(SubgraphFlags::empty(), None);
        }
        graph
    }

    #[test]
    fn topo_order_is_declaration_order_without_edges() {
        let graph = graph_with_nodes(4);
        assert_eq!(graph.topological_order().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn topo_order_respects_edges() {
        let mut graph = graph_with_nodes(3);
        graph.add_edge(2, 0).unwrap();
        let order = graph.topological_order().unwrap();
        let pos = |id: u32| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(2) < pos(0));
    }

    #[test]
    fn cycle_is_invalid_program() {
        let mut graph = graph_with_nodes(2);
        graph.add_edge(0, 1).unwrap();
        graph.add_edge(1, 0).unwrap();
        assert_eq!(graph.topological_order(), Err(GraphError::InvalidProgram));
    }

    #[test]
    fn self_edge_is_rejected() {
        let mut graph = graph_with_nodes(1);
        assert_eq!(graph.add_edge(0, 0), Err(GraphError::InvalidProgram));
    }
}
