/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Most-constrained-first, first-fit coloring.

use core::cmp::Reverse;

use smallvec::SmallVec;

use crate::interference::InterferenceGraph;
use crate::PReg;

/// Registers of `regs` no colored neighbour of `idx` uses, in order.
fn free_regs(
    graph: &InterferenceGraph,
    regs: &[PReg],
    colors: &[Option<PReg>],
    idx: usize,
) -> SmallVec<[PReg; 16]> {
    let taken: SmallVec<[PReg; 16]> = graph.adjacent(idx).filter_map(|n| colors[n]).collect();
    regs.iter()
        .copied()
        .filter(|preg| !taken.contains(preg))
        .collect()
}

/// Color every uncolored node of `graph`. Each step picks the node
/// with the fewest registers left over by its colored neighbours
/// (ties: higher degree, then lower register) and gives it the first of
/// them. Precolored nodes constrain the choice from the start. Fails
/// with the node that found no free register.
///
/// This is a heuristic: it can still fail on some graphs that do have
/// a coloring.
pub fn assign(
    graph: &InterferenceGraph,
    regs: &[PReg],
    colors: &mut [Option<PReg>],
) -> Result<(), usize> {
    let mut pending: Vec<usize> = (0..graph.num_nodes())
        .filter(|&idx| colors[idx].is_none())
        .collect();

    while !pending.is_empty() {
        let mut best: Option<(usize, SmallVec<[PReg; 16]>)> = None;
        for (pos, &idx) in pending.iter().enumerate() {
            let free = free_regs(graph, regs, colors, idx);
            let better = match &best {
                None => true,
                Some((best_pos, best_free)) => {
                    let key = |idx: usize, free: usize| {
                        (free, Reverse(graph.node_degree(idx)), graph.node(idx))
                    };
                    key(idx, free.len()) < key(pending[*best_pos], best_free.len())
                }
            };
            if better {
                best = Some((pos, free));
            }
        }

        let Some((pos, free)) = best else { break };
        let idx = pending.swap_remove(pos);
        match free.first() {
            Some(&preg) => {
                trace!("greedy: {} -> {} ({} free)", graph.node(idx), preg, free.len());
                colors[idx] = Some(preg);
            }
            None => return Err(idx),
        }
    }
    Ok(())
}
