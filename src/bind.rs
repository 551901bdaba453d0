/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Rewriting operands with their allocated registers.

use crate::{Allocation, Function};

/// Replace every virtual register in the operands of `func` by its
/// assignment in `allocation`. Physical registers and non-register
/// operands are left as they are, and so are virtual registers
/// `allocation` does not know; [`crate::verify_physical`] catches those.
pub fn bind(func: &mut Function, allocation: &Allocation) {
    for inst in &mut func.insts {
        for op in inst.operands.iter_mut() {
            *op = op.apply_allocation(allocation);
        }
    }
    trace!("bind: {} rewritten", func.name);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Arg, InstData, Mem, Operand, PReg, Reg, RegKind, VReg};

    #[test]
    fn test_bind_rewrites_registers_and_addresses() {
        let v0 = VReg::new(0, RegKind::Int);
        let v1 = VReg::new(1, RegKind::Int);
        let v2 = VReg::new(2, RegKind::Int);
        let p3 = PReg::new(3, RegKind::Int);
        let p5 = PReg::new(5, RegKind::Int);

        let mut func = Function::new("f");
        func.push(InstData::new(
            "lea",
            [
                Operand::reg_def(v0),
                Operand::mem_use(Mem::base(v1).with_index(p3, 8)),
                Operand::sym("table"),
            ],
        ));
        func.push(InstData::new("ret", [Operand::reg_use(v2)]));

        let mut allocation = Allocation::new();
        allocation.insert(v0, p5);
        allocation.insert(v1, p3);
        bind(&mut func, &allocation);

        let ops = &func.insts[crate::Inst::new(0)].operands;
        assert_eq!(ops[0].arg, Arg::Reg(Reg::Phys(p5)));
        assert_eq!(ops[1].arg, Arg::Mem(Mem::base(p3).with_index(p3, 8)));
        assert_eq!(ops[2].arg, Arg::Sym("table".into()));
        // Unassigned stays virtual.
        assert_eq!(
            func.insts[crate::Inst::new(1)].operands[0].arg,
            Arg::Reg(Reg::Virt(v2))
        );
    }
}
