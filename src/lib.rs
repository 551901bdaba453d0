/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Register allocation passes for an assembly generator.
//!
//! A front end hands over a [`File`] of [`Function`]s whose
//! instructions reference an unbounded supply of virtual registers
//! ([`VReg`]) next to concrete machine registers ([`PReg`]). The
//! passes in this crate compute liveness, build per-kind interference
//! graphs, choose a physical register for every virtual one, rewrite
//! the operands and finally check that nothing virtual is left, so the
//! file can be handed to a printer.
//!
//! The individual stages are available as plain functions
//! ([`Liveness::compute`], [`allocate`], [`bind`], [`verify_physical`])
//! and as composable passes in [`pass`].

#![allow(dead_code)]

use smallvec::{smallvec, SmallVec};

// The trace macro costs something even when the log level filters it
// out, so it is only compiled in with the `trace-log` feature.
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(feature = "trace-log") {
            ::log::trace!($($tt)*);
        }
    };
}

macro_rules! trace_enabled {
    () => {
        cfg!(feature = "trace-log") && ::log::log_enabled!(::log::Level::Trace)
    };
}

pub(crate) type FxHashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;
pub(crate) type FxHashSet<V> = hashbrown::HashSet<V, rustc_hash::FxBuildHasher>;

#[macro_use]
mod index;

pub mod allocation;
pub mod allocator;
pub mod bind;
pub mod checker;
pub mod function;
pub mod interference;
pub mod liveness;
pub mod pass;
pub(crate) mod postorder;
pub mod printer;
pub mod regset;


pub use allocation::Allocation;
pub use allocator::allocate;
pub use bind::bind;
pub use checker::{verify_physical, Checker, CheckerError, CheckerErrors};
pub use function::{File, Function, Inst, InstData, Insts};
pub use liveness::Liveness;
pub use regset::RegSet;

/// Register kinds. Each kind has its own physical register file;
/// registers of different kinds never interfere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub enum RegKind {
    Int = 0,
    Float = 1,
    Vector = 2,
}

impl RegKind {
    /// Number of register kinds.
    pub const COUNT: usize = 3;

    /// All kinds, in the order allocation processes them.
    pub const ALL: [RegKind; RegKind::COUNT] = [RegKind::Int, RegKind::Float, RegKind::Vector];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    fn from_bits(bits: usize) -> Self {
        match bits {
            0 => RegKind::Int,
            1 => RegKind::Float,
            2 => RegKind::Vector,
            _ => unreachable!(),
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            RegKind::Int => "i",
            RegKind::Float => "f",
            RegKind::Vector => "v",
        }
    }
}

/// A physical register. Contains a physical register number and a kind.
///
/// The `hw_enc` field contains the physical register number and is in
/// a logically separate index space per kind; in other words, Int
/// register 0 is different than Float register 0.
///
/// The value returned by `index()`, in contrast, is in a single index
/// space shared by all kinds, in order to enable uniform reasoning
/// about physical registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub struct PReg {
    hw_enc: u8,
    kind: RegKind,
}

impl PReg {
    pub const MAX_BITS: usize = 6;
    pub const MAX: usize = (1 << Self::MAX_BITS) - 1;
    pub const NUM_INDEX: usize = RegKind::COUNT << Self::MAX_BITS; // including RegKind bits

    /// Create a new PReg. The `hw_enc` range is 6 bits.
    #[inline(always)]
    pub const fn new(hw_enc: usize, kind: RegKind) -> Self {
        assert!(hw_enc <= PReg::MAX);
        PReg {
            hw_enc: hw_enc as u8,
            kind,
        }
    }

    /// The physical register number, as encoded by the ISA for the particular register kind.
    #[inline(always)]
    pub fn hw_enc(self) -> usize {
        self.hw_enc as usize
    }

    /// The register kind.
    #[inline(always)]
    pub fn kind(self) -> RegKind {
        self.kind
    }

    /// Get an index into the (not necessarily contiguous) index space of
    /// all physical registers. Allows one to maintain an array of data for
    /// all PRegs and index it efficiently.
    #[inline(always)]
    pub fn index(self) -> usize {
        ((self.kind as u8 as usize) << Self::MAX_BITS) | (self.hw_enc as usize)
    }

    #[inline(always)]
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < Self::NUM_INDEX);
        let kind = RegKind::from_bits((index >> Self::MAX_BITS) & 3);
        PReg::new(index & Self::MAX, kind)
    }
}

impl std::fmt::Debug for PReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "PReg(hw = {}, kind = {:?}, index = {})",
            self.hw_enc(),
            self.kind(),
            self.index()
        )
    }
}

impl std::fmt::Display for PReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "p{}{}", self.hw_enc(), self.kind().suffix())
    }
}

/// A virtual register. Contains a virtual register number and a kind.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub struct VReg {
    bits: u32,
}

impl VReg {
    pub const MAX_BITS: usize = 21;
    pub const MAX: usize = (1 << Self::MAX_BITS) - 1;

    #[inline(always)]
    pub const fn new(virt_reg: usize, kind: RegKind) -> Self {
        assert!(virt_reg <= VReg::MAX);
        VReg {
            bits: ((virt_reg as u32) << 2) | (kind as u8 as u32),
        }
    }

    #[inline(always)]
    pub fn vreg(self) -> usize {
        (self.bits >> 2) as usize
    }

    #[inline(always)]
    pub fn kind(self) -> RegKind {
        RegKind::from_bits((self.bits & 3) as usize)
    }
}

impl std::fmt::Debug for VReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "VReg(vreg = {}, kind = {:?})", self.vreg(), self.kind())
    }
}

impl std::fmt::Display for VReg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "v{}", self.vreg())
    }
}

/// A register reference as it appears in an operand: either a
/// concrete machine register or a virtual register still waiting for
/// one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub enum Reg {
    Phys(PReg),
    Virt(VReg),
}

impl Reg {
    #[inline(always)]
    pub fn kind(self) -> RegKind {
        match self {
            Reg::Phys(preg) => preg.kind(),
            Reg::Virt(vreg) => vreg.kind(),
        }
    }

    #[inline(always)]
    pub fn is_virtual(self) -> bool {
        matches!(self, Reg::Virt(_))
    }

    #[inline(always)]
    pub fn is_physical(self) -> bool {
        matches!(self, Reg::Phys(_))
    }

    /// The physical register this reference names, if it names one.
    #[inline(always)]
    pub fn to_physical(self) -> Option<PReg> {
        match self {
            Reg::Phys(preg) => Some(preg),
            Reg::Virt(_) => None,
        }
    }

    #[inline(always)]
    pub fn to_virtual(self) -> Option<VReg> {
        match self {
            Reg::Phys(_) => None,
            Reg::Virt(vreg) => Some(vreg),
        }
    }
}

impl From<PReg> for Reg {
    fn from(preg: PReg) -> Self {
        Reg::Phys(preg)
    }
}

impl From<VReg> for Reg {
    fn from(vreg: VReg) -> Self {
        Reg::Virt(vreg)
    }
}

impl std::fmt::Debug for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Reg::Phys(preg) => write!(f, "{}", preg),
            Reg::Virt(vreg) => write!(f, "{}", vreg),
        }
    }
}

/// How an instruction accesses an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub enum OperandKind {
    /// Written without being read.
    Def = 0,
    /// Read, then written.
    Mod = 1,
    /// Read only.
    Use = 2,
}

/// A memory address `[base + index*scale + disp]`. The address
/// registers are read whatever the access kind of the operand is.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub struct Mem {
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub scale: u8,
    pub disp: i32,
}

impl Mem {
    pub fn base(base: impl Into<Reg>) -> Self {
        Mem {
            base: Some(base.into()),
            index: None,
            scale: 1,
            disp: 0,
        }
    }

    pub fn with_index(mut self, index: impl Into<Reg>, scale: u8) -> Self {
        self.index = Some(index.into());
        self.scale = scale;
        self
    }

    pub fn with_disp(mut self, disp: i32) -> Self {
        self.disp = disp;
        self
    }

    pub fn regs(&self) -> impl Iterator<Item = Reg> + '_ {
        self.base.iter().chain(self.index.iter()).copied()
    }

    fn apply_allocation(&self, allocation: &Allocation) -> Mem {
        Mem {
            base: self.base.map(|reg| allocation.apply(reg)),
            index: self.index.map(|reg| allocation.apply(reg)),
            scale: self.scale,
            disp: self.disp,
        }
    }
}

impl std::fmt::Display for Mem {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[")?;
        let mut first = true;
        if let Some(base) = self.base {
            write!(f, "{}", base)?;
            first = false;
        }
        if let Some(index) = self.index {
            if !first {
                write!(f, " + ")?;
            }
            write!(f, "{}", index)?;
            if self.scale != 1 {
                write!(f, "*{}", self.scale)?;
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.disp)?;
        } else if self.disp > 0 {
            write!(f, " + {}", self.disp)?;
        } else if self.disp < 0 {
            write!(f, " - {}", -(self.disp as i64))?;
        }
        write!(f, "]")
    }
}

/// The value an operand slot refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub enum Arg {
    Reg(Reg),
    Mem(Mem),
    Imm(i64),
    /// A symbol or label name; never references a register.
    Sym(String),
}

impl std::fmt::Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Arg::Reg(reg) => write!(f, "{}", reg),
            Arg::Mem(mem) => write!(f, "{}", mem),
            Arg::Imm(imm) => write!(f, "${}", imm),
            Arg::Sym(name) => write!(f, "{}", name),
        }
    }
}

/// An `Operand` is one slot of an instruction: what it refers to and
/// whether the instruction reads it, writes it, or both.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub struct Operand {
    pub arg: Arg,
    pub kind: OperandKind,
}

impl Operand {
    #[inline(always)]
    pub fn new(arg: Arg, kind: OperandKind) -> Self {
        Operand { arg, kind }
    }

    /// A register read by the instruction.
    #[inline(always)]
    pub fn reg_use(reg: impl Into<Reg>) -> Self {
        Operand::new(Arg::Reg(reg.into()), OperandKind::Use)
    }

    /// A register written by the instruction without being read.
    #[inline(always)]
    pub fn reg_def(reg: impl Into<Reg>) -> Self {
        Operand::new(Arg::Reg(reg.into()), OperandKind::Def)
    }

    /// A register both read and written, e.g. the destination of a
    /// two-address `add`.
    #[inline(always)]
    pub fn reg_mod(reg: impl Into<Reg>) -> Self {
        Operand::new(Arg::Reg(reg.into()), OperandKind::Mod)
    }

    /// A memory location read by the instruction.
    #[inline(always)]
    pub fn mem_use(mem: Mem) -> Self {
        Operand::new(Arg::Mem(mem), OperandKind::Use)
    }

    /// A memory location written by the instruction.
    #[inline(always)]
    pub fn mem_def(mem: Mem) -> Self {
        Operand::new(Arg::Mem(mem), OperandKind::Def)
    }

    #[inline(always)]
    pub fn imm(value: i64) -> Self {
        Operand::new(Arg::Imm(value), OperandKind::Use)
    }

    #[inline(always)]
    pub fn sym(name: impl Into<String>) -> Self {
        Operand::new(Arg::Sym(name.into()), OperandKind::Use)
    }

    /// Every register this operand mentions.
    pub fn regs(&self) -> SmallVec<[Reg; 2]> {
        match &self.arg {
            Arg::Reg(reg) => smallvec![*reg],
            Arg::Mem(mem) => mem.regs().collect(),
            Arg::Imm(_) | Arg::Sym(_) => smallvec![],
        }
    }

    /// Registers read when the instruction executes.
    pub fn input_regs(&self) -> SmallVec<[Reg; 2]> {
        match (&self.arg, self.kind) {
            (Arg::Reg(_), OperandKind::Def) => smallvec![],
            (Arg::Reg(reg), OperandKind::Use | OperandKind::Mod) => smallvec![*reg],
            (Arg::Mem(mem), _) => mem.regs().collect(),
            (Arg::Imm(_) | Arg::Sym(_), _) => smallvec![],
        }
    }

    /// Registers written when the instruction executes.
    pub fn output_regs(&self) -> SmallVec<[Reg; 2]> {
        match (&self.arg, self.kind) {
            (Arg::Reg(reg), OperandKind::Def | OperandKind::Mod) => smallvec![*reg],
            _ => smallvec![],
        }
    }

    /// Return an equivalent operand with every virtual register that
    /// has an entry in `allocation` replaced by its physical register.
    pub fn apply_allocation(&self, allocation: &Allocation) -> Operand {
        let arg = match &self.arg {
            Arg::Reg(reg) => Arg::Reg(allocation.apply(*reg)),
            Arg::Mem(mem) => Arg::Mem(mem.apply_allocation(allocation)),
            other => other.clone(),
        };
        Operand {
            arg,
            kind: self.kind,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.arg)
    }
}

/// A machine envrionment tells the register allocator which registers
/// are available to allocate, per kind.
///
/// Registers are handed out in order: every preferred register of a
/// kind is tried before any non-preferred one.
#[derive(Clone, Debug, Default)]
#[cfg_attr(
    feature = "enable-serde",
    derive(::serde::Serialize, ::serde::Deserialize)
)]
pub struct MachineEnv {
    /// Preferred physical registers for each kind. These are the
    /// registers that will be allocated first, if free.
    pub preferred_regs_by_kind: [Vec<PReg>; RegKind::COUNT],

    /// Non-preferred physical registers for each kind. These are the
    /// registers that will be allocated if a preferred register is
    /// not available, e.g. callee-saved registers.
    pub non_preferred_regs_by_kind: [Vec<PReg>; RegKind::COUNT],
}

impl MachineEnv {
    /// The allocatable register file of `kind`, in allocation order.
    pub fn regs(&self, kind: RegKind) -> impl Iterator<Item = PReg> + '_ {
        self.preferred_regs_by_kind[kind.index()]
            .iter()
            .chain(self.non_preferred_regs_by_kind[kind.index()].iter())
            .copied()
    }

    pub fn num_regs(&self, kind: RegKind) -> usize {
        self.preferred_regs_by_kind[kind.index()].len()
            + self.non_preferred_regs_by_kind[kind.index()].len()
    }
}

/// Which strategy colors each kind's interference graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Most-constrained register first, first free physical register.
    #[default]
    Greedy,
    /// Chaitin-style simplify/select with Briggs' optimistic push.
    Coloring,
}

/// Options for allocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegallocOptions {
    /// Add extra verbosity to debug logs.
    pub verbose_log: bool,

    /// Run the allocation checker on the result before returning it.
    pub validate_allocation: bool,

    /// The coloring strategy used for every register kind.
    pub algorithm: Algorithm,
}

/// An error that prevents allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegAllocError {
    /// A register of this kind is referenced but the machine
    /// environment has no register file to allocate it from.
    UnsupportedKind(RegKind),
    /// Too many registers of one kind are live at once: no physical
    /// register is left for `vreg`. There is no spilling.
    TooManyLiveRegs { kind: RegKind, vreg: VReg },
    /// Two per-kind allocations disagree on the target of `vreg`.
    MergeConflict {
        vreg: VReg,
        existing: PReg,
        new: PReg,
    },
    /// A virtual register survived binding.
    NonPhysicalReg { inst: Inst, vreg: VReg },
    /// Allocation was requested before liveness was computed.
    MissingLiveness,
    /// The allocation checker rejected the result.
    InvalidAllocation(CheckerErrors),
}

impl std::fmt::Display for RegAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for RegAllocError {}

/// Allocate, bind and verify a single function: the standard
/// pipeline without the pass plumbing.
pub fn run_function(
    func: &mut Function,
    env: &MachineEnv,
    options: &RegallocOptions,
) -> Result<(), RegAllocError> {
    let liveness = Liveness::compute(func);
    func.allocation = None;
    let allocation = allocate(func, &liveness, env, options)?;
    bind(func, &allocation);
    func.liveness = Some(liveness);
    func.allocation = Some(allocation);
    verify_physical(func)
}

/// Run [`run_function`] on every function of `file`, stopping at the
/// first failure.
pub fn run(
    file: &mut File,
    env: &MachineEnv,
    options: &RegallocOptions,
) -> Result<(), RegAllocError> {
    for func in file.functions_mut() {
        run_function(func, env, options)?;
    }
    Ok(())
}
