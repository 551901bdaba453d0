/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Interference graph of one register kind.

use crate::{FxHashMap, FxHashSet, Reg, RegKind};

/// Symmetric interference relation between the registers of one kind.
///
/// Nodes are numbered densely in insertion order; the node numbers are
/// what the coloring strategies work on.
#[derive(Clone, Debug)]
pub struct InterferenceGraph {
    kind: RegKind,
    nodes: Vec<Reg>,
    index: FxHashMap<Reg, u32>,
    adj: Vec<FxHashSet<u32>>,
    num_edges: usize,
}

impl InterferenceGraph {
    pub fn new(kind: RegKind) -> Self {
        InterferenceGraph {
            kind,
            nodes: vec![],
            index: FxHashMap::default(),
            adj: vec![],
            num_edges: 0,
        }
    }

    pub fn kind(&self) -> RegKind {
        self.kind
    }

    /// Add `reg` as a node if it is not one yet, and return its node
    /// number.
    pub fn add_node(&mut self, reg: Reg) -> usize {
        debug_assert_eq!(reg.kind(), self.kind);
        if let Some(&idx) = self.index.get(&reg) {
            return idx as usize;
        }
        let idx = self.nodes.len();
        self.nodes.push(reg);
        self.index.insert(reg, idx as u32);
        self.adj.push(FxHashSet::default());
        idx
    }

    /// Record that `a` and `b` are live at the same time. Self edges and
    /// registers of another kind are ignored. Returns true if the edge
    /// is new.
    pub fn add_edge(&mut self, a: Reg, b: Reg) -> bool {
        if a == b || a.kind() != self.kind || b.kind() != self.kind {
            return false;
        }
        let a = self.add_node(a);
        let b = self.add_node(b);
        if !self.adj[a].insert(b as u32) {
            return false;
        }
        self.adj[b].insert(a as u32);
        self.num_edges += 1;
        trace!("interference: {} -- {}", self.nodes[a], self.nodes[b]);
        true
    }

    pub fn interferes(&self, a: Reg, b: Reg) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&a), Some(&b)) => self.adj[a as usize].contains(&b),
            _ => false,
        }
    }

    pub fn node_index(&self, reg: Reg) -> Option<usize> {
        self.index.get(&reg).map(|&idx| idx as usize)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    #[inline(always)]
    pub fn node(&self, idx: usize) -> Reg {
        self.nodes[idx]
    }

    pub fn nodes(&self) -> &[Reg] {
        &self.nodes[..]
    }

    /// Node numbers adjacent to node `idx`.
    pub fn adjacent(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.adj[idx].iter().map(|&n| n as usize)
    }

    pub fn node_degree(&self, idx: usize) -> usize {
        self.adj[idx].len()
    }

    /// Registers interfering with `reg`.
    pub fn neighbors(&self, reg: Reg) -> impl Iterator<Item = Reg> + '_ {
        self.node_index(reg)
            .into_iter()
            .flat_map(move |idx| self.adjacent(idx))
            .map(move |n| self.nodes[n])
    }

    pub fn degree(&self, reg: Reg) -> usize {
        self.node_index(reg).map_or(0, |idx| self.node_degree(idx))
    }

    pub fn dump(&self) {
        trace!(
            "interference graph ({:?}): {} nodes, {} edges",
            self.kind,
            self.nodes.len(),
            self.num_edges
        );
        for (idx, reg) in self.nodes.iter().enumerate() {
            let mut adj: Vec<Reg> = self.adjacent(idx).map(|n| self.nodes[n]).collect();
            adj.sort_unstable();
            trace!("  {}: {:?}", reg, adj);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{PReg, VReg};

    #[test]
    fn test_symmetric_edges() {
        let v0 = Reg::Virt(VReg::new(0, RegKind::Int));
        let v1 = Reg::Virt(VReg::new(1, RegKind::Int));
        let p0 = Reg::Phys(PReg::new(0, RegKind::Int));

        let mut graph = InterferenceGraph::new(RegKind::Int);
        assert!(graph.add_edge(v0, v1));
        assert!(!graph.add_edge(v1, v0));
        assert!(graph.add_edge(v0, p0));
        assert!(!graph.add_edge(v0, v0));

        assert!(graph.interferes(v1, v0));
        assert!(graph.interferes(p0, v0));
        assert!(!graph.interferes(v1, p0));
        assert_eq!(graph.num_edges(), 2);
        assert_eq!(graph.degree(v0), 2);
        assert_eq!(graph.degree(v1), 1);

        let mut n: Vec<Reg> = graph.neighbors(v0).collect();
        n.sort_unstable();
        assert_eq!(n, vec![p0, v1]);
    }

    #[test]
    fn test_mixed_kinds_never_interfere() {
        let v0 = Reg::Virt(VReg::new(0, RegKind::Int));
        let f1 = Reg::Virt(VReg::new(1, RegKind::Float));

        let mut graph = InterferenceGraph::new(RegKind::Int);
        assert!(!graph.add_edge(v0, f1));
        assert!(!graph.interferes(v0, f1));
        assert_eq!(graph.num_nodes(), 0);
        assert_eq!(graph.num_edges(), 0);
    }
}
