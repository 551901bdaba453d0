/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Liveness analysis.
//!
//! Classic backward dataflow over the instruction graph:
//!
//! ```text
//! LiveOut(i) = ∪ LiveIn(s)                for every present successor s
//! LiveIn(i)  = uses(i) ∪ (LiveOut(i) − defs(i))
//! ```
//!
//! LiveIn is seeded with the input registers of each instruction and
//! LiveOut starts empty. Every iteration only ever adds registers, so
//! the sets are bounded by the registers the function mentions and the
//! iteration terminates. Whether an iteration changed anything is
//! tracked with the insertion flags of [`RegSet`], never by comparing
//! sizes.

use smallvec::SmallVec;

use crate::postorder;
use crate::{Function, Inst, Reg, RegSet};

/// Per-instruction live-in and live-out sets of a function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Liveness {
    live_in: Vec<RegSet>,
    live_out: Vec<RegSet>,
    defs: Vec<SmallVec<[Reg; 4]>>,
    /// Visiting order of one iteration.
    order: Vec<Inst>,
    iterations: usize,
}

impl Liveness {
    /// Seed the analysis: LiveIn holds the inputs of each instruction,
    /// LiveOut is empty. Nothing is propagated yet.
    pub fn new(func: &Function) -> Self {
        let n = func.num_insts();
        let mut live_in = Vec::with_capacity(n);
        let mut defs = Vec::with_capacity(n);
        for inst in &func.insts {
            live_in.push(inst.input_registers().into_iter().collect::<RegSet>());
            defs.push(inst.output_registers());
        }

        Liveness {
            live_in,
            live_out: vec![RegSet::new(); n],
            defs,
            order: visiting_order(func),
            iterations: 0,
        }
    }

    /// Run one iteration over every instruction. Returns true if any
    /// set grew.
    pub fn step(&mut self, func: &Function) -> bool {
        let live_in = &mut self.live_in;
        let live_out = &mut self.live_out;
        let mut changed = false;

        for &inst in &self.order {
            let i = inst.index();
            for succ in func.insts[inst].succs() {
                changed |= live_out[i].union_with(&live_in[succ.index()]);
            }
            for reg in live_out[i].difference(&self.defs[i]) {
                changed |= live_in[i].insert(reg);
            }
        }

        self.iterations += 1;
        trace!("liveness: iteration {} changed = {}", self.iterations, changed);
        changed
    }

    /// Compute liveness of `func` to the fixed point.
    pub fn compute(func: &Function) -> Self {
        let mut liveness = Liveness::new(func);
        while liveness.step(func) {}
        trace!(
            "liveness: {} converged after {} iterations",
            func.name,
            liveness.iterations
        );
        if trace_enabled!() {
            for (inst, data) in func.insts.enumerate() {
                trace!(
                    "  {}: {}  in {:?} out {:?}",
                    inst,
                    data,
                    liveness.live_in(inst),
                    liveness.live_out(inst)
                );
            }
        }
        liveness
    }

    #[inline(always)]
    pub fn live_in(&self, inst: Inst) -> &RegSet {
        &self.live_in[inst.index()]
    }

    #[inline(always)]
    pub fn live_out(&self, inst: Inst) -> &RegSet {
        &self.live_out[inst.index()]
    }

    /// Registers written by `inst`, clobbers included.
    #[inline(always)]
    pub fn defs(&self, inst: Inst) -> &[Reg] {
        &self.defs[inst.index()][..]
    }

    pub fn num_insts(&self) -> usize {
        self.live_in.len()
    }

    /// Number of iterations run so far, the last (unchanging) one
    /// included.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

/// Postorder from the first instruction, so successors are mostly
/// visited before their predecessors, then whatever the walk did not
/// reach in reverse program order.
fn visiting_order(func: &Function) -> Vec<Inst> {
    let n = func.num_insts();
    let mut order = Vec::with_capacity(n);
    if n == 0 {
        return order;
    }

    let mut visited = vec![];
    postorder::calculate(n, Inst::new(0), &mut visited, &mut order, |inst| {
        &func.insts[inst].succs[..]
    });
    for i in (0..n).rev() {
        if !visited[i] {
            order.push(Inst::new(i));
        }
    }
    order
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{InstData, Operand, RegKind, VReg};

    fn v(n: usize) -> Reg {
        Reg::Virt(VReg::new(n, RegKind::Int))
    }

    #[test]
    fn test_empty_function() {
        let func = Function::new("empty");
        let liveness = Liveness::compute(&func);
        assert_eq!(liveness.num_insts(), 0);
        assert_eq!(liveness.iterations(), 1);
    }

    #[test]
    fn test_seed() {
        let mut func = Function::new("f");
        let next = Inst::new(1);
        func.push(
            InstData::new("mov", [Operand::reg_def(v(0)), Operand::reg_use(v(1))])
                .with_succs([Some(next)]),
        );
        func.push(InstData::new("ret", [Operand::reg_use(v(0))]));

        let liveness = Liveness::new(&func);
        assert_eq!(liveness.live_in(Inst::new(0)).sorted(), vec![v(1)]);
        assert!(liveness.live_out(Inst::new(0)).is_empty());
        assert_eq!(liveness.defs(Inst::new(0)), &[v(0)][..]);
        assert_eq!(liveness.iterations(), 0);
    }

    #[test]
    fn test_self_loop() {
        // loop: add v0, v1 ; jmp loop
        let mut func = Function::new("spin");
        func.push(
            InstData::new("add", [Operand::reg_mod(v(0)), Operand::reg_use(v(1))])
                .with_succs([Some(Inst::new(0))]),
        );
        let liveness = Liveness::compute(&func);
        let i0 = Inst::new(0);
        assert_eq!(liveness.live_in(i0).sorted(), vec![v(0), v(1)]);
        assert_eq!(liveness.live_out(i0).sorted(), vec![v(0), v(1)]);
    }

    #[test]
    fn test_unreachable_instructions_analyzed() {
        let mut func = Function::new("f");
        func.push(InstData::new("ret", []));
        // Never reached from the entry, still gets its own sets.
        func.push(
            InstData::new("mov", [Operand::reg_def(v(0)), Operand::reg_use(v(1))])
                .with_succs([Some(Inst::new(2))]),
        );
        func.push(InstData::new("ret", [Operand::reg_use(v(0))]));

        let liveness = Liveness::compute(&func);
        assert!(liveness.live_in(Inst::new(0)).is_empty());
        assert_eq!(liveness.live_in(Inst::new(1)).sorted(), vec![v(1)]);
        assert_eq!(liveness.live_out(Inst::new(1)).sorted(), vec![v(0)]);
    }
}
