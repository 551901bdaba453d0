/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! The result of register allocation: a physical register for every
//! virtual one.

use crate::{FxHashMap, PReg, Reg, RegAllocError, VReg};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    map: FxHashMap<VReg, PReg>,
}

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `vreg` to `preg`, returning the previous assignment.
    pub fn insert(&mut self, vreg: VReg, preg: PReg) -> Option<PReg> {
        debug_assert_eq!(vreg.kind(), preg.kind());
        self.map.insert(vreg, preg)
    }

    #[inline(always)]
    pub fn get(&self, vreg: VReg) -> Option<PReg> {
        self.map.get(&vreg).copied()
    }

    /// The physical register `reg` ends up in: itself if it is
    /// physical, its assignment if it is virtual and has one.
    #[inline(always)]
    pub fn lookup(&self, reg: Reg) -> Option<PReg> {
        match reg {
            Reg::Phys(preg) => Some(preg),
            Reg::Virt(vreg) => self.get(vreg),
        }
    }

    /// Rewrite `reg`. Unassigned virtual registers are left alone.
    #[inline(always)]
    pub fn apply(&self, reg: Reg) -> Reg {
        self.lookup(reg).map_or(reg, Reg::Phys)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VReg, PReg)> + '_ {
        self.map.iter().map(|(&v, &p)| (v, p))
    }

    /// All assignments, ordered by virtual register.
    pub fn sorted(&self) -> Vec<(VReg, PReg)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable();
        entries
    }

    /// Add every assignment of `other`. An assignment that disagrees
    /// with one already present is a [`RegAllocError::MergeConflict`];
    /// `self` is left untouched in that case.
    pub fn merge(&mut self, other: &Allocation) -> Result<(), RegAllocError> {
        for (vreg, new) in other.sorted() {
            if let Some(existing) = self.get(vreg) {
                if existing != new {
                    return Err(RegAllocError::MergeConflict {
                        vreg,
                        existing,
                        new,
                    });
                }
            }
        }
        self.map.extend(other.iter());
        Ok(())
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_map().entries(self.sorted()).finish()
    }
}

impl std::fmt::Display for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (vreg, preg) in self.sorted() {
            writeln!(f, "{} -> {}", vreg, preg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::RegKind;

    #[test]
    fn test_merge_conflict() {
        let v0 = VReg::new(0, RegKind::Int);
        let v1 = VReg::new(1, RegKind::Int);
        let p0 = PReg::new(0, RegKind::Int);
        let p1 = PReg::new(1, RegKind::Int);

        let mut a = Allocation::new();
        a.insert(v0, p0);
        let mut b = Allocation::new();
        b.insert(v1, p1);
        b.insert(v0, p1);

        assert_eq!(
            a.merge(&b),
            Err(RegAllocError::MergeConflict {
                vreg: v0,
                existing: p0,
                new: p1,
            })
        );
        // Nothing from `b` leaked in.
        assert_eq!(a.sorted(), vec![(v0, p0)]);
    }

    #[test]
    fn test_merge_agreeing() {
        let v0 = VReg::new(0, RegKind::Int);
        let f0 = VReg::new(1, RegKind::Float);
        let p0 = PReg::new(0, RegKind::Int);
        let q0 = PReg::new(0, RegKind::Float);

        let mut a = Allocation::new();
        a.insert(v0, p0);
        let mut b = Allocation::new();
        b.insert(v0, p0);
        b.insert(f0, q0);

        assert_eq!(a.merge(&b), Ok(()));
        assert_eq!(a.len(), 2);
        assert_eq!(a.lookup(Reg::Virt(f0)), Some(q0));
        let unassigned = Reg::Virt(VReg::new(7, RegKind::Int));
        assert_eq!(a.apply(unassigned), unassigned);
        assert_eq!(a.to_string(), "v0 -> p0i\nv1 -> p0f\n");
    }
}
