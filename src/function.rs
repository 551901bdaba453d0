/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Instructions, functions and files as handed over by the front end.

use smallvec::SmallVec;

use crate::{Allocation, Liveness, Operand, PReg, Reg, RegKind, VReg};

define_index!(Inst, Insts, InstData);

impl std::fmt::Display for Inst {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "inst{}", self.0)
    }
}

/// A single instruction.
///
/// Successor links index into the owning function's instruction list.
/// A `None` slot is an absent edge (e.g. a branch whose fallthrough
/// was never materialized) and is skipped by every analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub struct InstData {
    pub opcode: String,
    pub operands: SmallVec<[Operand; 3]>,
    /// Physical registers the instruction overwrites without naming
    /// them as operands, e.g. caller-saved registers at a call.
    pub clobbers: SmallVec<[PReg; 2]>,
    pub succs: SmallVec<[Option<Inst>; 2]>,
}

impl InstData {
    pub fn new(opcode: impl Into<String>, operands: impl IntoIterator<Item = Operand>) -> Self {
        InstData {
            opcode: opcode.into(),
            operands: operands.into_iter().collect(),
            clobbers: SmallVec::new(),
            succs: SmallVec::new(),
        }
    }

    pub fn with_succs(mut self, succs: impl IntoIterator<Item = Option<Inst>>) -> Self {
        self.succs = succs.into_iter().collect();
        self
    }

    pub fn with_clobbers(mut self, clobbers: impl IntoIterator<Item = PReg>) -> Self {
        self.clobbers = clobbers.into_iter().collect();
        self
    }

    /// The present successor edges.
    pub fn succs(&self) -> impl Iterator<Item = Inst> + '_ {
        self.succs.iter().flatten().copied()
    }

    /// Every register named by an operand, without duplicates, in
    /// operand order. Clobbers are not operands and are not included.
    pub fn registers(&self) -> SmallVec<[Reg; 4]> {
        let mut regs = SmallVec::new();
        for op in &self.operands {
            for reg in op.regs() {
                push_unique(&mut regs, reg);
            }
        }
        regs
    }

    /// Registers read by this instruction before it writes anything.
    pub fn input_registers(&self) -> SmallVec<[Reg; 4]> {
        let mut regs = SmallVec::new();
        for op in &self.operands {
            for reg in op.input_regs() {
                push_unique(&mut regs, reg);
            }
        }
        regs
    }

    /// Registers written by this instruction, clobbers included.
    pub fn output_registers(&self) -> SmallVec<[Reg; 4]> {
        let mut regs = SmallVec::new();
        for op in &self.operands {
            for reg in op.output_regs() {
                push_unique(&mut regs, reg);
            }
        }
        for &preg in &self.clobbers {
            push_unique(&mut regs, Reg::Phys(preg));
        }
        regs
    }
}

fn push_unique(regs: &mut SmallVec<[Reg; 4]>, reg: Reg) {
    if !regs.contains(&reg) {
        regs.push(reg);
    }
}

impl std::fmt::Display for InstData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, op)?;
        }
        Ok(())
    }
}

/// A function: its instructions plus the analysis and allocation
/// results the passes attach to it.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub insts: Insts,
    num_vregs: usize,
    pinned: Vec<(VReg, PReg)>,
    /// Result of the liveness pass; recomputed from scratch on every run.
    pub liveness: Option<Liveness>,
    /// Result of the allocation pass; `None` until allocation succeeds.
    pub allocation: Option<Allocation>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            insts: Insts::new(),
            num_vregs: 0,
            pinned: vec![],
            liveness: None,
            allocation: None,
        }
    }

    /// Append an instruction and return its index.
    pub fn push(&mut self, inst: InstData) -> Inst {
        for reg in inst.registers() {
            if let Reg::Virt(vreg) = reg {
                self.num_vregs = self.num_vregs.max(vreg.vreg() + 1);
            }
        }
        self.insts.push(inst)
    }

    /// The index the next pushed instruction will get; handy for
    /// forward branches.
    pub fn next_inst(&self) -> Inst {
        Inst::new(self.insts.len())
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Get a fresh virtual register of `kind`.
    pub fn new_vreg(&mut self, kind: RegKind) -> VReg {
        let vreg = VReg::new(self.num_vregs, kind);
        self.num_vregs += 1;
        vreg
    }

    /// Number of virtual register numbers in use.
    pub fn num_vregs(&self) -> usize {
        self.num_vregs
    }

    /// Require `vreg` to be allocated to `preg`, e.g. because a calling
    /// convention says so. Pinning again replaces the earlier choice.
    pub fn pin(&mut self, vreg: VReg, preg: PReg) {
        assert_eq!(vreg.kind(), preg.kind());
        match self.pinned.iter_mut().find(|(v, _)| *v == vreg) {
            Some(entry) => entry.1 = preg,
            None => self.pinned.push((vreg, preg)),
        }
    }

    /// Is the given vreg pinned to a preg?
    pub fn is_pinned_vreg(&self, vreg: VReg) -> Option<PReg> {
        self.pinned
            .iter()
            .find(|(v, _)| *v == vreg)
            .map(|&(_, preg)| preg)
    }

    /// Return a list of all pinned vregs with their registers.
    pub fn pinned_vregs(&self) -> &[(VReg, PReg)] {
        &self.pinned[..]
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for inst in &self.insts {
            writeln!(f, "\t{}", inst)?;
        }
        Ok(())
    }
}

/// An ordered collection of functions.
#[derive(Clone, Debug, Default)]
pub struct File {
    functions: Vec<Function>,
}

impl File {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, func: Function) {
        self.functions.push(func);
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions[..]
    }

    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions[..]
    }
}

impl FromIterator<Function> for File {
    fn from_iter<T: IntoIterator<Item = Function>>(iter: T) -> Self {
        File {
            functions: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for File {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Mem;

    fn r(n: usize) -> VReg {
        VReg::new(n, RegKind::Int)
    }

    fn p(n: usize) -> PReg {
        PReg::new(n, RegKind::Int)
    }

    #[test]
    fn test_input_output_registers() {
        // add v0, [v1 + v2*4]
        let inst = InstData::new(
            "add",
            [
                Operand::reg_mod(r(0)),
                Operand::mem_use(Mem::base(r(1)).with_index(r(2), 4)),
            ],
        );
        assert_eq!(
            inst.input_registers().to_vec(),
            vec![Reg::Virt(r(0)), Reg::Virt(r(1)), Reg::Virt(r(2))]
        );
        assert_eq!(inst.output_registers().to_vec(), vec![Reg::Virt(r(0))]);

        // mov [v1], v0 reads both registers and writes none.
        let store = InstData::new(
            "mov",
            [Operand::mem_def(Mem::base(r(1))), Operand::reg_use(r(0))],
        );
        assert_eq!(
            store.input_registers().to_vec(),
            vec![Reg::Virt(r(1)), Reg::Virt(r(0))]
        );
        assert!(store.output_registers().is_empty());
    }

    #[test]
    fn test_registers_deduplicated() {
        let inst = InstData::new("xor", [Operand::reg_def(r(3)), Operand::reg_use(r(3))])
            .with_clobbers([p(0)]);
        assert_eq!(inst.registers().to_vec(), vec![Reg::Virt(r(3))]);
        assert_eq!(
            inst.output_registers().to_vec(),
            vec![Reg::Virt(r(3)), Reg::Phys(p(0))]
        );
    }

    #[test]
    fn test_absent_successors_skipped() {
        let inst = InstData::new("jnz", [Operand::sym("loop")])
            .with_succs([None, Some(Inst::new(4))]);
        assert_eq!(inst.succs().collect::<Vec<_>>(), vec![Inst::new(4)]);
    }

    #[test]
    fn test_vreg_numbering_and_pins() {
        let mut func = Function::new("f");
        func.push(InstData::new("mov", [Operand::reg_def(r(5))]));
        assert_eq!(func.num_vregs(), 6);
        let fresh = func.new_vreg(RegKind::Float);
        assert_eq!(fresh.vreg(), 6);
        assert_eq!(fresh.kind(), RegKind::Float);

        func.pin(r(5), p(1));
        func.pin(r(5), p(2));
        assert_eq!(func.is_pinned_vreg(r(5)), Some(p(2)));
        assert_eq!(func.pinned_vregs().len(), 1);
        assert_eq!(func.is_pinned_vreg(r(0)), None);
    }

    #[test]
    fn test_display() {
        let mut func = Function::new("store");
        func.push(InstData::new(
            "mov",
            [
                Operand::mem_def(Mem::base(p(4)).with_disp(-8)),
                Operand::imm(3),
            ],
        ));
        func.push(InstData::new("ret", []));
        assert_eq!(func.to_string(), "store:\n\tmov [p4i - 8], $3\n\tret\n");
    }
}
