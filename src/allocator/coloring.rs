/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Chaitin-style graph coloring with Briggs' optimistic push.
//!
//! Simplify removes nodes of degree less than the number of registers
//! first: they can always be colored whatever their neighbours get.
//! When only high-degree nodes remain, the one with the highest degree
//! is pushed anyway in the hope that its neighbours end up sharing
//! colors. Select then pops the stack and gives each node the first
//! free register. A node that finds none would be spilled by a
//! complete allocator; here it is a failure.

use smallvec::SmallVec;

use crate::interference::InterferenceGraph;
use crate::PReg;

pub fn assign(
    graph: &InterferenceGraph,
    regs: &[PReg],
    colors: &mut [Option<PReg>],
) -> Result<(), usize> {
    let k = regs.len();
    let n = graph.num_nodes();

    // Precolored nodes never leave the graph.
    let mut removed: Vec<bool> = colors.iter().map(|c| c.is_some()).collect();
    let mut degree: Vec<usize> = (0..n).map(|idx| graph.adjacent(idx).count()).collect();
    let mut remaining = removed.iter().filter(|&&r| !r).count();
    let mut stack = Vec::with_capacity(remaining);

    while remaining > 0 {
        // Lowest node number among the trivially colorable ones, so the
        // result does not depend on hash order.
        let pick = (0..n)
            .filter(|&idx| !removed[idx])
            .find(|&idx| degree[idx] < k)
            .or_else(|| {
                (0..n)
                    .filter(|&idx| !removed[idx])
                    .max_by(|&a, &b| degree[a].cmp(&degree[b]).then(b.cmp(&a)))
            });
        let Some(idx) = pick else { break };
        if degree[idx] >= k {
            trace!("coloring: optimistically pushing {}", graph.node(idx));
        }

        removed[idx] = true;
        remaining -= 1;
        stack.push(idx);
        for m in graph.adjacent(idx) {
            degree[m] -= 1;
        }
    }

    while let Some(idx) = stack.pop() {
        let taken: SmallVec<[PReg; 16]> = graph.adjacent(idx).filter_map(|m| colors[m]).collect();
        match regs.iter().find(|&preg| !taken.contains(preg)) {
            Some(&preg) => colors[idx] = Some(preg),
            None => return Err(idx),
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Reg, RegKind, VReg};

    fn v(n: usize) -> Reg {
        Reg::Virt(VReg::new(n, RegKind::Int))
    }

    fn p(n: usize) -> PReg {
        PReg::new(n, RegKind::Int)
    }

    fn check(graph: &InterferenceGraph, colors: &[Option<PReg>]) {
        for idx in 0..graph.num_nodes() {
            assert!(colors[idx].is_some());
            for m in graph.adjacent(idx) {
                assert_ne!(colors[idx], colors[m]);
            }
        }
    }

    #[test]
    fn test_four_cycle_two_colors() {
        let mut graph = InterferenceGraph::new(RegKind::Int);
        for i in 0..4 {
            graph.add_edge(v(i), v((i + 1) % 4));
        }
        let mut colors = vec![None; graph.num_nodes()];
        // Every node has degree 2 = k, so this only works optimistically.
        assert_eq!(assign(&graph, &[p(0), p(1)], &mut colors), Ok(()));
        check(&graph, &colors);
    }

    #[test]
    fn test_triangle_needs_three() {
        let mut graph = InterferenceGraph::new(RegKind::Int);
        graph.add_edge(v(0), v(1));
        graph.add_edge(v(1), v(2));
        graph.add_edge(v(2), v(0));

        let mut colors = vec![None; graph.num_nodes()];
        assert!(assign(&graph, &[p(0), p(1)], &mut colors).is_err());

        let mut colors = vec![None; graph.num_nodes()];
        assert_eq!(assign(&graph, &[p(0), p(1), p(2)], &mut colors), Ok(()));
        check(&graph, &colors);
    }

    #[test]
    fn test_precolored_stays() {
        let mut graph = InterferenceGraph::new(RegKind::Int);
        graph.add_edge(Reg::Phys(p(0)), v(0));
        graph.add_edge(Reg::Phys(p(0)), v(1));
        graph.add_edge(v(0), v(1));
        let mut colors: Vec<_> = graph.nodes().iter().map(|r| r.to_physical()).collect();
        assert_eq!(assign(&graph, &[p(0), p(1), p(2)], &mut colors), Ok(()));
        assert_eq!(colors[0], Some(p(0)));
        check(&graph, &colors);
    }
}
