/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Interference-graph register allocation.
//!
//! Registers are partitioned by kind and every kind is allocated on
//! its own: build the interference graph from liveness, precolor the
//! physical and pinned registers, color the rest with the selected
//! [`Algorithm`], then merge the per-kind results. There is no
//! spilling; a kind that needs more registers than its register file
//! holds fails with [`RegAllocError::TooManyLiveRegs`].

use core::ops::{Index, IndexMut};

use smallvec::SmallVec;

use crate::interference::InterferenceGraph;
use crate::{
    Algorithm, Allocation, Checker, Function, Liveness, MachineEnv, PReg, Reg, RegAllocError,
    RegKind, RegSet, RegallocOptions,
};

mod coloring;
mod greedy;

/// One value per register kind.
#[derive(Clone, Debug, Default)]
pub struct PartedByKind<T> {
    items: [T; RegKind::COUNT],
}

impl<T> Index<RegKind> for PartedByKind<T> {
    type Output = T;

    fn index(&self, index: RegKind) -> &Self::Output {
        &self.items[index.index()]
    }
}

impl<T> IndexMut<RegKind> for PartedByKind<T> {
    fn index_mut(&mut self, index: RegKind) -> &mut Self::Output {
        &mut self.items[index.index()]
    }
}

/// Allocation state of a single register kind.
#[derive(Clone, Debug)]
pub struct KindAllocator {
    kind: RegKind,
    /// The register file, in allocation order.
    regs: SmallVec<[PReg; 16]>,
    graph: InterferenceGraph,
}

impl KindAllocator {
    /// Fails with [`RegAllocError::UnsupportedKind`] if `env` has no
    /// registers of `kind`.
    pub fn new(kind: RegKind, env: &MachineEnv) -> Result<Self, RegAllocError> {
        let regs: SmallVec<[PReg; 16]> = env.regs(kind).collect();
        if regs.is_empty() {
            return Err(RegAllocError::UnsupportedKind(kind));
        }
        debug_assert!(regs.iter().all(|preg| preg.kind() == kind));
        Ok(KindAllocator {
            kind,
            regs,
            graph: InterferenceGraph::new(kind),
        })
    }

    pub fn kind(&self) -> RegKind {
        self.kind
    }

    pub fn graph(&self) -> &InterferenceGraph {
        &self.graph
    }

    /// Make `reg` part of this allocation even if it interferes with
    /// nothing.
    pub fn add(&mut self, reg: Reg) {
        self.graph.add_node(reg);
    }

    /// `def` is written while every member of `live` is live.
    pub fn add_interference(&mut self, def: Reg, live: &RegSet) {
        for reg in live.of_kind(self.kind) {
            self.graph.add_edge(def, reg);
        }
    }

    /// Color the graph and return the assignment of every virtual
    /// register of this kind.
    pub fn allocate(
        &self,
        func: &Function,
        algorithm: Algorithm,
    ) -> Result<Allocation, RegAllocError> {
        let mut colors = self.precolor(func)?;

        let result = match algorithm {
            Algorithm::Greedy => greedy::assign(&self.graph, &self.regs, &mut colors),
            Algorithm::Coloring => coloring::assign(&self.graph, &self.regs, &mut colors),
        };
        if let Err(idx) = result {
            return Err(self.capacity_error(idx));
        }

        let mut allocation = Allocation::new();
        for (idx, color) in colors.iter().enumerate() {
            if let (Reg::Virt(vreg), Some(preg)) = (self.graph.node(idx), *color) {
                trace!("alloc: {} -> {}", vreg, preg);
                allocation.insert(vreg, preg);
            }
        }
        Ok(allocation)
    }

    /// Physical registers are their own color and pinned virtual
    /// registers take their pin. Two interfering precolored nodes with
    /// the same color cannot be fixed without spilling.
    fn precolor(&self, func: &Function) -> Result<Vec<Option<PReg>>, RegAllocError> {
        let colors: Vec<Option<PReg>> = self
            .graph
            .nodes()
            .iter()
            .map(|&reg| match reg {
                Reg::Phys(preg) => Some(preg),
                Reg::Virt(vreg) => func.is_pinned_vreg(vreg),
            })
            .collect();

        for (idx, color) in colors.iter().enumerate() {
            let Some(color) = color else { continue };
            for n in self.graph.adjacent(idx) {
                if n > idx && colors[n] == Some(*color) {
                    // Blame the virtual one; two distinct nodes cannot
                    // both be the same physical register.
                    let culprit = if self.graph.node(n).is_virtual() { n } else { idx };
                    trace!(
                        "alloc: {} and {} both need {}",
                        self.graph.node(idx),
                        self.graph.node(n),
                        color
                    );
                    return Err(self.capacity_error(culprit));
                }
            }
        }
        Ok(colors)
    }

    fn capacity_error(&self, idx: usize) -> RegAllocError {
        match self.graph.node(idx) {
            Reg::Virt(vreg) => RegAllocError::TooManyLiveRegs {
                kind: self.kind,
                vreg,
            },
            Reg::Phys(_) => unreachable!("physical registers are always colored"),
        }
    }
}

/// Choose a physical register for every virtual register of `func`.
///
/// `liveness` must have been computed for `func` as it is now. The
/// function itself is not modified; see [`crate::bind`].
pub fn allocate(
    func: &Function,
    liveness: &Liveness,
    env: &MachineEnv,
    options: &RegallocOptions,
) -> Result<Allocation, RegAllocError> {
    if liveness.num_insts() != func.num_insts() {
        return Err(RegAllocError::MissingLiveness);
    }

    let mut allocators: PartedByKind<Option<KindAllocator>> = PartedByKind::default();
    for inst in &func.insts {
        for reg in inst.registers() {
            let slot = &mut allocators[reg.kind()];
            if slot.is_none() {
                *slot = Some(KindAllocator::new(reg.kind(), env)?);
            }
            if let Some(allocator) = slot {
                allocator.add(reg);
            }
        }
    }

    for (inst, _) in func.insts.enumerate() {
        let live_out = liveness.live_out(inst);
        for &def in liveness.defs(inst) {
            // A clobber of a kind nothing else uses has nobody to
            // interfere with.
            if let Some(allocator) = &mut allocators[def.kind()] {
                allocator.add_interference(def, live_out);
            }
        }
    }

    let mut allocation = Allocation::new();
    for kind in RegKind::ALL {
        let Some(allocator) = &allocators[kind] else {
            continue;
        };
        if options.verbose_log && trace_enabled!() {
            allocator.graph().dump();
        }
        let part = allocator.allocate(func, options.algorithm)?;
        allocation.merge(&part)?;
    }
    trace!(
        "alloc: {} registers assigned in {}",
        allocation.len(),
        func.name
    );

    if options.validate_allocation {
        Checker::new(func, liveness, &allocation)
            .run()
            .map_err(RegAllocError::InvalidAllocation)?;
    }
    Ok(allocation)
}
