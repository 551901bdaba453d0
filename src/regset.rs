/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Register sets as used by liveness and interference.

use crate::{FxHashSet, Reg, RegKind};

/// An unordered set of registers, physical and virtual alike.
///
/// Mutating operations report whether the set actually changed, which
/// is what the liveness fixed-point iteration keys off.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegSet {
    regs: FxHashSet<Reg>,
}

impl RegSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    #[inline(always)]
    pub fn contains(&self, reg: Reg) -> bool {
        self.regs.contains(&reg)
    }

    /// Returns true if `reg` was not already present.
    #[inline(always)]
    pub fn insert(&mut self, reg: Reg) -> bool {
        self.regs.insert(reg)
    }

    /// Returns true if `reg` was present.
    #[inline(always)]
    pub fn remove(&mut self, reg: Reg) -> bool {
        self.regs.remove(&reg)
    }

    /// Add every member of `other`. Returns true if anything was added.
    pub fn union_with(&mut self, other: &RegSet) -> bool {
        let mut changed = false;
        for &reg in &other.regs {
            changed |= self.regs.insert(reg);
        }
        changed
    }

    /// Members of `self` that are not in `excluded`.
    pub fn difference<'a>(&'a self, excluded: &'a [Reg]) -> impl Iterator<Item = Reg> + 'a {
        self.regs
            .iter()
            .copied()
            .filter(move |reg| !excluded.contains(reg))
    }

    /// Members of the given kind.
    pub fn of_kind(&self, kind: RegKind) -> impl Iterator<Item = Reg> + '_ {
        self.regs.iter().copied().filter(move |reg| reg.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = Reg> + '_ {
        self.regs.iter().copied()
    }

    /// The members in a stable order, for output and tests.
    pub fn sorted(&self) -> Vec<Reg> {
        let mut regs: Vec<Reg> = self.regs.iter().copied().collect();
        regs.sort_unstable();
        regs
    }
}

impl FromIterator<Reg> for RegSet {
    fn from_iter<T: IntoIterator<Item = Reg>>(iter: T) -> Self {
        let mut set = RegSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<Reg> for RegSet {
    fn extend<T: IntoIterator<Item = Reg>>(&mut self, iter: T) {
        self.regs.extend(iter);
    }
}

impl<'a> IntoIterator for &'a RegSet {
    type Item = &'a Reg;
    type IntoIter = hashbrown::hash_set::Iter<'a, Reg>;

    fn into_iter(self) -> Self::IntoIter {
        self.regs.iter()
    }
}

impl std::fmt::Debug for RegSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_set().entries(self.sorted()).finish()
    }
}
