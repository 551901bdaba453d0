/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Fast postorder computation over instruction successor links.

use crate::Inst;
use smallvec::{smallvec, SmallVec};

/// Compute a postorder of the instructions reachable from `entry` into
/// `out`. Absent successor slots are skipped. Loops are fine: every
/// instruction is pushed once.
pub fn calculate<'a, SuccFn: Fn(Inst) -> &'a [Option<Inst>]>(
    num_insts: usize,
    entry: Inst,
    visited_scratch: &mut Vec<bool>,
    out: &mut Vec<Inst>,
    succ_insts: SuccFn,
) {
    // State: visited-instruction map, and explicit DFS stack.
    struct State<'a> {
        inst: Inst,
        succs: core::slice::Iter<'a, Option<Inst>>,
    }

    visited_scratch.clear();
    visited_scratch.resize(num_insts, false);
    let visited = visited_scratch;
    let mut stack: SmallVec<[State; 64]> = smallvec![];
    out.clear();

    visited[entry.index()] = true;
    stack.push(State {
        inst: entry,
        succs: succ_insts(entry).iter(),
    });

    while let Some(ref mut state) = stack.last_mut() {
        // Perform one action: push to new succ, skip an already-visited succ, or pop.
        match state.succs.next() {
            Some(&Some(succ)) => {
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    stack.push(State {
                        inst: succ,
                        succs: succ_insts(succ).iter(),
                    });
                }
            }
            Some(&None) => {}
            None => {
                out.push(state.inst);
                stack.pop();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(succs: &[Vec<Option<Inst>>]) -> Vec<usize> {
        let mut visited = vec![];
        let mut out = vec![];
        calculate(succs.len(), Inst::new(0), &mut visited, &mut out, |i| {
            &succs[i.index()][..]
        });
        out.iter().map(|i| i.index()).collect()
    }

    #[test]
    fn test_straight_line() {
        let i = |n| Some(Inst::new(n));
        let succs = vec![vec![i(1)], vec![i(2)], vec![]];
        assert_eq!(run(&succs), vec![2, 1, 0]);
    }

    #[test]
    fn test_loop_and_absent_edges() {
        let i = |n| Some(Inst::new(n));
        // 0 -> 1 -> 2 -> {1, 3}, 3 has an absent slot, 4 is unreachable.
        let succs = vec![vec![i(1)], vec![i(2)], vec![i(1), i(3)], vec![None], vec![]];
        assert_eq!(run(&succs), vec![3, 2, 1, 0]);
    }
}
