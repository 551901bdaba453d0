/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Checking allocation results.
//!
//! Two levels of checking are provided. [`verify_physical`] is the
//! cheap integrity check run at the end of every pipeline: after
//! binding, no operand may still name a virtual register.
//!
//! [`Checker`] audits an [`Allocation`] against the liveness it was
//! computed from, before binding. It replays the interference rule
//! (every register written by an instruction is distinct from every
//! other register live after it) on physical registers instead of
//! trusting the interference graph, and also checks completeness,
//! register kinds and pins. All problems are collected, not just the
//! first one.

use crate::{Allocation, FxHashSet, Function, Inst, Liveness, PReg, Reg, RegAllocError, VReg};

/// Fail with [`RegAllocError::NonPhysicalReg`] at the first operand
/// that still references a virtual register.
pub fn verify_physical(func: &Function) -> Result<(), RegAllocError> {
    for (inst, data) in func.insts.enumerate() {
        for reg in data.registers() {
            if let Reg::Virt(vreg) = reg {
                trace!("verify: {} still has {} at {}", func.name, vreg, inst);
                return Err(RegAllocError::NonPhysicalReg { inst, vreg });
            }
        }
    }
    Ok(())
}

/// A set of errors detected by the allocation checker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckerErrors {
    pub errors: Vec<CheckerError>,
}

/// A single error detected by the allocation checker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckerError {
    /// A virtual register is referenced but has no assignment.
    MissingAllocation { inst: Inst, vreg: VReg },
    /// A virtual register is assigned a register of another kind.
    KindMismatch { vreg: VReg, preg: PReg },
    /// `def` is written at `inst` while `live` is live after it, and
    /// both end up in `preg`.
    ConflictingAllocation {
        inst: Inst,
        def: Reg,
        live: Reg,
        preg: PReg,
    },
    /// A pinned virtual register was assigned somewhere else.
    PinnedRegMoved {
        vreg: VReg,
        expected: PReg,
        actual: PReg,
    },
}

impl std::fmt::Display for CheckerError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CheckerError::MissingAllocation { inst, vreg } => {
                write!(f, "{}: no register for {}", inst, vreg)
            }
            CheckerError::KindMismatch { vreg, preg } => {
                write!(f, "{} ({:?}) assigned to {}", vreg, vreg.kind(), preg)
            }
            CheckerError::ConflictingAllocation {
                inst,
                def,
                live,
                preg,
            } => write!(
                f,
                "{}: {} overwrites {} in {} while it is live",
                inst, def, live, preg
            ),
            CheckerError::PinnedRegMoved {
                vreg,
                expected,
                actual,
            } => write!(f, "{} is pinned to {} but got {}", vreg, expected, actual),
        }
    }
}

impl std::fmt::Display for CheckerErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} allocation errors", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CheckerErrors {}

pub struct Checker<'a> {
    func: &'a Function,
    liveness: &'a Liveness,
    allocation: &'a Allocation,
}

impl<'a> Checker<'a> {
    pub fn new(func: &'a Function, liveness: &'a Liveness, allocation: &'a Allocation) -> Self {
        Checker {
            func,
            liveness,
            allocation,
        }
    }

    pub fn run(&self) -> Result<(), CheckerErrors> {
        let mut errors = vec![];
        self.check_complete(&mut errors);
        self.check_kinds(&mut errors);
        self.check_pins(&mut errors);
        self.check_interference(&mut errors);

        if errors.is_empty() {
            return Ok(());
        }
        trace!("checker: {} errors in {}", errors.len(), self.func.name);
        for error in &errors {
            trace!("  {}", error);
        }
        Err(CheckerErrors { errors })
    }

    fn check_complete(&self, errors: &mut Vec<CheckerError>) {
        let mut reported = FxHashSet::default();
        for (inst, data) in self.func.insts.enumerate() {
            for reg in data.registers() {
                if let Reg::Virt(vreg) = reg {
                    if self.allocation.get(vreg).is_none() && reported.insert(vreg) {
                        errors.push(CheckerError::MissingAllocation { inst, vreg });
                    }
                }
            }
        }
    }

    fn check_kinds(&self, errors: &mut Vec<CheckerError>) {
        for (vreg, preg) in self.allocation.sorted() {
            if vreg.kind() != preg.kind() {
                errors.push(CheckerError::KindMismatch { vreg, preg });
            }
        }
    }

    fn check_pins(&self, errors: &mut Vec<CheckerError>) {
        for &(vreg, expected) in self.func.pinned_vregs() {
            match self.allocation.get(vreg) {
                Some(actual) if actual != expected => {
                    errors.push(CheckerError::PinnedRegMoved {
                        vreg,
                        expected,
                        actual,
                    });
                }
                _ => {}
            }
        }
    }

    fn check_interference(&self, errors: &mut Vec<CheckerError>) {
        for (inst, _) in self.func.insts.enumerate() {
            let mut live_out = self.liveness.live_out(inst).sorted();
            live_out.retain(|reg| self.allocation.lookup(*reg).is_some());
            for &def in self.liveness.defs(inst) {
                let Some(preg) = self.allocation.lookup(def) else {
                    continue;
                };
                for &live in &live_out {
                    if live != def && self.allocation.lookup(live) == Some(preg) {
                        errors.push(CheckerError::ConflictingAllocation {
                            inst,
                            def,
                            live,
                            preg,
                        });
                    }
                }
            }
        }
    }
}
