//! IR Type Definitions
//!
//! Operands and instructions live in per-function arenas and are referred to
//! by integer handles ([`OperandId`], [`InstId`]). Program order is a separate
//! list of instruction handles: passes replace the handle's instruction in
//! place, and deletion drops the handle from the order list, so no pass ever
//! holds a pointer into another pass's data.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::bytecode::Constant;
use crate::error::{CompileError, Result};
use crate::x64::registers::Reg64;

/// Live-range bound that has not been computed (or was never reached)
pub const UNSET: usize = usize::MAX;

/// Handle of an operand in [`IrFunction`]'s operand arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperandId(pub u32);

impl OperandId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of an instruction in [`IrFunction`]'s instruction arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// Symbolic jump target, numbered as in the bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Set of types an operand may hold at runtime.
///
/// An empty set means nothing is known. A set with exactly one bit proves the
/// type. Bits are only ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeHints(u8);

impl TypeHints {
    pub const INT: TypeHints = TypeHints(1 << 0);
    pub const BOOL: TypeHints = TypeHints(1 << 1);
    pub const STRING: TypeHints = TypeHints(1 << 2);
    pub const NONE: TypeHints = TypeHints(1 << 3);
    /// Records, closures and other heap objects
    pub const OBJECT: TypeHints = TypeHints(1 << 4);
    pub const ANY: TypeHints = TypeHints(0b1_1111);

    pub const fn empty() -> Self {
        TypeHints(0)
    }

    pub fn of_constant(constant: &Constant) -> Self {
        match constant {
            Constant::None => TypeHints::NONE,
            Constant::Integer(_) => TypeHints::INT,
            Constant::String(_) => TypeHints::STRING,
            Constant::Boolean(_) => TypeHints::BOOL,
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: TypeHints) -> TypeHints {
        TypeHints(self.0 | other.0)
    }

    pub fn contains(self, other: TypeHints) -> bool {
        self.0 & other.0 == other.0
    }

    /// Proven to be exactly `ty`
    pub fn is(self, ty: TypeHints) -> bool {
        self == ty
    }

    /// Possibly `ty`; an operand with no hints may be anything
    pub fn may_be(self, ty: TypeHints) -> bool {
        self.is_empty() || self.0 & ty.0 != 0
    }
}

impl fmt::Display for TypeHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "?");
        }
        let names = [
            (TypeHints::INT, "int"),
            (TypeHints::BOOL, "bool"),
            (TypeHints::STRING, "str"),
            (TypeHints::NONE, "none"),
            (TypeHints::OBJECT, "obj"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", parts.join("|"))
    }
}

/// What an operand denotes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Compiler-generated value with a single definition
    Temp(usize),
    /// Local variable slot
    Var(usize),
    /// Global name slot
    Glob(usize),
    /// Closure-reference slot (the cell itself)
    Ref(usize),
    /// Value stored in a closure-reference cell
    Deref(usize),
    /// Entry of the nested-function table
    Function(usize),
    /// Literal
    Const(Constant),
    /// Return-value register after a call or helper
    RetVal,
}

impl OperandKind {
    /// Kinds that are interned: one operand per slot per function
    fn is_location(&self) -> bool {
        matches!(
            self,
            OperandKind::Glob(_)
                | OperandKind::Ref(_)
                | OperandKind::Deref(_)
                | OperandKind::Function(_)
                | OperandKind::RetVal
        )
    }
}

/// An IR value with its analysis results
#[derive(Debug, Clone)]
pub struct Operand {
    pub kind: OperandKind,
    pub types: TypeHints,
    /// Source hint: the value is this literal
    pub constant: Option<Constant>,
    /// Source hint: the value was read from this `Var` and not changed since
    pub var_alias: Option<OperandId>,
    pub live_start: usize,
    pub live_end: usize,
    pub reg: Option<Reg64>,
}

impl Operand {
    pub fn new(kind: OperandKind) -> Self {
        let (types, constant) = match &kind {
            OperandKind::Const(c) => (TypeHints::of_constant(c), Some(c.clone())),
            _ => (TypeHints::empty(), None),
        };
        Self {
            kind,
            types,
            constant,
            var_alias: None,
            live_start: UNSET,
            live_end: UNSET,
            reg: None,
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self.kind, OperandKind::Temp(_))
    }

    pub fn is_var(&self) -> bool {
        matches!(self.kind, OperandKind::Var(_))
    }

    pub fn is_int(&self) -> bool {
        self.types.is(TypeHints::INT)
    }

    pub fn is_bool(&self) -> bool {
        self.types.is(TypeHints::BOOL)
    }

    pub fn is_const(&self) -> bool {
        self.constant.is_some()
    }

    /// Number of the variable or temp, if the operand is one
    pub fn slot(&self) -> Option<usize> {
        match self.kind {
            OperandKind::Temp(n) | OperandKind::Var(n) => Some(n),
            _ => None,
        }
    }

    pub fn has_live_range(&self) -> bool {
        self.live_start != UNSET
    }

    /// Defined but never read
    pub fn is_dead(&self) -> bool {
        self.live_start != UNSET && self.live_end == UNSET
    }

    pub fn reset_liveness(&mut self) {
        self.live_start = UNSET;
        self.live_end = UNSET;
    }
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// Generic addition (integers, string concatenation) via a helper
    Add,
    /// Addition of two proven integers
    IntAdd,
    Sub,
    Mul,
    Div,
    Gt,
    Geq,
    /// Generic structural equality via a helper
    Eq,
    /// Equality of two proven scalars of the same type
    FastEq,
    And,
    Or,
}

impl BinOp {
    /// Type the result is known to have
    pub fn result_hint(self) -> TypeHints {
        match self {
            BinOp::Add => TypeHints::empty(),
            BinOp::IntAdd | BinOp::Sub | BinOp::Mul | BinOp::Div => TypeHints::INT,
            BinOp::Gt | BinOp::Geq | BinOp::Eq | BinOp::FastEq | BinOp::And | BinOp::Or => {
                TypeHints::BOOL
            }
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::IntAdd => "int_add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Gt => "gt",
            BinOp::Geq => "geq",
            BinOp::Eq => "eq",
            BinOp::FastEq => "fast_eq",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        write!(f, "{}", s)
    }
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn result_hint(self) -> TypeHints {
        match self {
            UnOp::Neg => TypeHints::INT,
            UnOp::Not => TypeHints::BOOL,
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "neg"),
            UnOp::Not => write!(f, "not"),
        }
    }
}

/// Runtime helper routines reachable from IR
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperCall {
    GarbageCollect,
    /// Result in `RetVal`
    AllocRecord,
    /// Result in `RetVal`
    FieldLoad { field: usize, record: OperandId },
    FieldStore {
        field: usize,
        record: OperandId,
        value: OperandId,
    },
    /// Result in `RetVal`
    IndexLoad { record: OperandId, index: OperandId },
    IndexStore {
        record: OperandId,
        index: OperandId,
        value: OperandId,
    },
    ThrowUninitialized { name: usize },
}

/// Runtime type assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertKind {
    Int,
    NotZero,
    Bool,
}

impl fmt::Display for AssertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertKind::Int => write!(f, "assert_int"),
            AssertKind::NotZero => write!(f, "assert_not_zero"),
            AssertKind::Bool => write!(f, "assert_bool"),
        }
    }
}

/// IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Materialize a temp from any operand
    Assign { dest: OperandId, src: OperandId },
    /// Write a temp into a variable, global or closure cell
    Store { dest: OperandId, src: OperandId },
    /// Fill a register-resident variable from the locals array
    ForceLoad { var: OperandId },
    Binary {
        op: BinOp,
        dest: OperandId,
        lhs: OperandId,
        rhs: OperandId,
    },
    Unary {
        op: UnOp,
        dest: OperandId,
        src: OperandId,
    },
    /// Call a closure; the result is in `RetVal`
    Call {
        closure: OperandId,
        args: Vec<OperandId>,
    },
    /// Build a closure; the result is in `RetVal`
    AllocClosure {
        function: OperandId,
        refs: Vec<OperandId>,
    },
    Return { value: OperandId },
    Label { label: LabelId },
    Jump { label: LabelId },
    /// Jump with a short native encoding
    ShortJump { label: LabelId },
    /// Jump when `cond` is `true`
    CondJump { cond: OperandId, label: LabelId },
    CallHelper(HelperCall),
    CallAssert { kind: AssertKind, arg: OperandId },
    /// One value copied into two temps (`dup`)
    Fork {
        src: OperandId,
        dest1: OperandId,
        dest2: OperandId,
    },
}

impl Inst {
    /// Temps (or other operands) this instruction defines
    pub fn defs(&self) -> Vec<OperandId> {
        match self {
            Inst::Assign { dest, .. } | Inst::Binary { dest, .. } | Inst::Unary { dest, .. } => {
                vec![*dest]
            }
            Inst::Fork { dest1, dest2, .. } => vec![*dest1, *dest2],
            _ => Vec::new(),
        }
    }

    /// Operands this instruction reads
    pub fn uses(&self) -> Vec<OperandId> {
        let mut out = Vec::new();
        self.for_each_use(|id| out.push(id));
        out
    }

    fn for_each_use(&self, mut f: impl FnMut(OperandId)) {
        match self {
            Inst::Assign { src, .. } | Inst::Store { src, .. } => f(*src),
            Inst::Binary { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Inst::Unary { src, .. } | Inst::Fork { src, .. } => f(*src),
            Inst::Call { closure, args } => {
                f(*closure);
                args.iter().for_each(|a| f(*a));
            }
            Inst::AllocClosure { function, refs } => {
                f(*function);
                refs.iter().for_each(|r| f(*r));
            }
            Inst::Return { value } => f(*value),
            Inst::CondJump { cond, .. } => f(*cond),
            Inst::CallAssert { arg, .. } => f(*arg),
            Inst::CallHelper(helper) => match helper {
                HelperCall::FieldLoad { record, .. } => f(*record),
                HelperCall::FieldStore { record, value, .. } => {
                    f(*record);
                    f(*value);
                }
                HelperCall::IndexLoad { record, index } => {
                    f(*record);
                    f(*index);
                }
                HelperCall::IndexStore {
                    record,
                    index,
                    value,
                } => {
                    f(*record);
                    f(*index);
                    f(*value);
                }
                HelperCall::GarbageCollect
                | HelperCall::AllocRecord
                | HelperCall::ThrowUninitialized { .. } => {}
            },
            Inst::ForceLoad { .. }
            | Inst::Label { .. }
            | Inst::Jump { .. }
            | Inst::ShortJump { .. } => {}
        }
    }

    /// Mutable handles to every operand this instruction reads
    pub fn uses_mut(&mut self) -> Vec<&mut OperandId> {
        match self {
            Inst::Assign { src, .. } | Inst::Store { src, .. } => vec![src],
            Inst::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Inst::Unary { src, .. } | Inst::Fork { src, .. } => vec![src],
            Inst::Call { closure, args } => {
                let mut out = vec![closure];
                out.extend(args.iter_mut());
                out
            }
            Inst::AllocClosure { function, refs } => {
                let mut out = vec![function];
                out.extend(refs.iter_mut());
                out
            }
            Inst::Return { value } => vec![value],
            Inst::CondJump { cond, .. } => vec![cond],
            Inst::CallAssert { arg, .. } => vec![arg],
            Inst::CallHelper(helper) => match helper {
                HelperCall::FieldLoad { record, .. } => vec![record],
                HelperCall::FieldStore { record, value, .. } => vec![record, value],
                HelperCall::IndexLoad { record, index } => vec![record, index],
                HelperCall::IndexStore {
                    record,
                    index,
                    value,
                } => vec![record, index, value],
                HelperCall::GarbageCollect
                | HelperCall::AllocRecord
                | HelperCall::ThrowUninitialized { .. } => Vec::new(),
            },
            Inst::ForceLoad { .. }
            | Inst::Label { .. }
            | Inst::Jump { .. }
            | Inst::ShortJump { .. } => Vec::new(),
        }
    }

    /// Jump target, for jumps
    pub fn jump_target(&self) -> Option<LabelId> {
        match self {
            Inst::Jump { label } | Inst::ShortJump { label } | Inst::CondJump { label, .. } => {
                Some(*label)
            }
            _ => None,
        }
    }

    /// Whether the instruction only computes its destination
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Inst::Assign { .. } | Inst::Binary { .. } | Inst::Unary { .. } | Inst::Fork { .. }
        )
    }
}

/// A function in IR form
#[derive(Debug, Clone, Default)]
pub struct IrFunction {
    pub name: String,
    pub parameter_count: usize,
    pub var_names: Vec<String>,
    pub global_names: Vec<String>,
    pub ref_names: Vec<String>,
    operands: Vec<Operand>,
    insts: Vec<Inst>,
    order: Vec<InstId>,
    /// Positions deleted by the running pass, dropped by `compact`
    pending_removal: BTreeSet<usize>,
    labels: BTreeMap<LabelId, usize>,
    vars: BTreeMap<usize, OperandId>,
    temps: Vec<OperandId>,
    locations: HashMap<OperandKind, OperandId>,
}

impl IrFunction {
    pub fn new(name: impl Into<String>) -> Self {
        IrFunction {
            name: name.into(),
            ..Default::default()
        }
    }

    // ==================== Operands ====================

    fn add_operand(&mut self, operand: Operand) -> OperandId {
        let id = OperandId(self.operands.len() as u32);
        self.operands.push(operand);
        id
    }

    pub fn operand(&self, id: OperandId) -> &Operand {
        &self.operands[id.index()]
    }

    pub fn operand_mut(&mut self, id: OperandId) -> &mut Operand {
        &mut self.operands[id.index()]
    }

    pub fn kind(&self, id: OperandId) -> &OperandKind {
        &self.operands[id.index()].kind
    }

    pub fn is_temp(&self, id: OperandId) -> bool {
        self.operand(id).is_temp()
    }

    pub fn is_var(&self, id: OperandId) -> bool {
        self.operand(id).is_var()
    }

    /// Allocate a fresh temp
    pub fn new_temp(&mut self) -> OperandId {
        let id = self.add_operand(Operand::new(OperandKind::Temp(self.temps.len())));
        self.temps.push(id);
        id
    }

    /// The operand for local variable `n`, created on first use
    pub fn var(&mut self, n: usize) -> OperandId {
        if let Some(&id) = self.vars.get(&n) {
            return id;
        }
        let mut operand = Operand::new(OperandKind::Var(n));
        if n < self.parameter_count {
            // Arguments arrive from callers we know nothing about
            operand.types = TypeHints::ANY;
        }
        let id = self.add_operand(operand);
        self.vars.insert(n, id);
        id
    }

    /// The operand for a global, reference, function slot or `RetVal`
    pub fn location(&mut self, kind: OperandKind) -> Result<OperandId> {
        if !kind.is_location() {
            return Err(CompileError::unexpected_operand(
                format!("{:?}", kind),
                "location lookup",
            ));
        }
        if let Some(&id) = self.locations.get(&kind) {
            return Ok(id);
        }
        let id = self.add_operand(Operand::new(kind.clone()));
        self.locations.insert(kind, id);
        Ok(id)
    }

    /// A fresh literal operand
    pub fn constant(&mut self, value: Constant) -> OperandId {
        self.add_operand(Operand::new(OperandKind::Const(value)))
    }

    pub fn temps(&self) -> &[OperandId] {
        &self.temps
    }

    pub fn num_temps(&self) -> usize {
        self.temps.len()
    }

    /// Variable operands in slot order
    pub fn vars(&self) -> impl Iterator<Item = OperandId> + '_ {
        self.vars.values().copied()
    }

    /// Every operand handle
    pub fn operand_ids(&self) -> impl Iterator<Item = OperandId> {
        (0..self.operands.len() as u32).map(OperandId)
    }

    /// Add type hints; returns whether anything changed
    pub fn add_types(&mut self, id: OperandId, types: TypeHints) -> bool {
        let operand = self.operand_mut(id);
        let merged = operand.types.union(types);
        let changed = merged != operand.types;
        operand.types = merged;
        changed
    }

    pub fn reset_liveness(&mut self) {
        for operand in &mut self.operands {
            operand.reset_liveness();
        }
    }

    // ==================== Instructions ====================

    /// Append an instruction; returns its position
    pub fn push(&mut self, inst: Inst) -> usize {
        let pos = self.order.len();
        if let Inst::Label { label } = &inst {
            let label = *label;
            self.labels.insert(label, pos);
        }
        let id = InstId(self.insts.len() as u32);
        self.insts.push(inst);
        self.order.push(id);
        pos
    }

    /// Number of positions, including ones pending removal
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn inst(&self, pos: usize) -> &Inst {
        &self.insts[self.order[pos].0 as usize]
    }

    pub fn inst_mut(&mut self, pos: usize) -> &mut Inst {
        &mut self.insts[self.order[pos].0 as usize]
    }

    /// Replace the instruction at `pos` in place
    pub fn replace(&mut self, pos: usize, inst: Inst) {
        *self.inst_mut(pos) = inst;
    }

    /// Delete the instruction at `pos` once the running pass finishes
    pub fn remove(&mut self, pos: usize) {
        self.pending_removal.insert(pos);
    }

    pub fn is_removed(&self, pos: usize) -> bool {
        self.pending_removal.contains(&pos)
    }

    /// Insert before `pos`. Only valid while no removal is pending.
    pub fn insert(&mut self, pos: usize, inst: Inst) -> Result<()> {
        if !self.pending_removal.is_empty() {
            return Err(CompileError::invalid_operation(
                "instruction inserted while deletions are pending",
            ));
        }
        let id = InstId(self.insts.len() as u32);
        self.insts.push(inst);
        self.order.insert(pos, id);
        self.reindex_labels();
        Ok(())
    }

    /// Drop every pending deletion from the order list; returns how many
    pub fn compact(&mut self) -> usize {
        if self.pending_removal.is_empty() {
            return 0;
        }
        let removed = std::mem::take(&mut self.pending_removal);
        let count = removed.len();
        let mut pos = 0;
        self.order.retain(|_| {
            let keep = !removed.contains(&pos);
            pos += 1;
            keep
        });
        self.reindex_labels();
        count
    }

    fn reindex_labels(&mut self) {
        self.labels.clear();
        for pos in 0..self.order.len() {
            if let Inst::Label { label } = self.inst(pos) {
                let label = *label;
                self.labels.insert(label, pos);
            }
        }
    }

    /// Live instructions with their positions
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Inst)> + '_ {
        (0..self.order.len())
            .filter(|pos| !self.is_removed(*pos))
            .map(|pos| (pos, self.inst(pos)))
    }

    /// Live instructions in program order
    pub fn instructions(&self) -> Vec<&Inst> {
        self.iter().map(|(_, inst)| inst).collect()
    }

    /// Position of `label`
    pub fn label_position(&self, label: LabelId) -> Result<usize> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(CompileError::UnknownLabel { label: label.0 })
    }

    pub fn labels(&self) -> &BTreeMap<LabelId, usize> {
        &self.labels
    }

    // ==================== Printing ====================

    /// Display name of an operand
    pub fn operand_name(&self, id: OperandId) -> String {
        let named = |names: &[String], n: usize, fallback: &str| {
            names
                .get(n)
                .cloned()
                .unwrap_or_else(|| format!("{}{}", fallback, n))
        };
        match &self.operand(id).kind {
            OperandKind::Temp(n) => format!("t{}", n),
            OperandKind::Var(n) => format!("%{}", named(&self.var_names, *n, "v")),
            OperandKind::Glob(n) => format!("@{}", named(&self.global_names, *n, "g")),
            OperandKind::Ref(n) => format!("&{}", named(&self.ref_names, *n, "r")),
            OperandKind::Deref(n) => format!("*{}", named(&self.ref_names, *n, "r")),
            OperandKind::Function(n) => format!("fn{}", n),
            OperandKind::Const(c) => format!("${}", c),
            OperandKind::RetVal => "retval".to_string(),
        }
    }

    fn names(&self, ids: &[OperandId]) -> String {
        ids.iter()
            .map(|id| self.operand_name(*id))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Debug form of one instruction
    pub fn format_inst(&self, inst: &Inst) -> String {
        let n = |id: &OperandId| self.operand_name(*id);
        match inst {
            Inst::Assign { dest, src } => format!("{} = {}", n(dest), n(src)),
            Inst::Store { dest, src } => format!("{} <- {}", n(dest), n(src)),
            Inst::ForceLoad { var } => format!("force_load {}", n(var)),
            Inst::Binary { op, dest, lhs, rhs } => {
                format!("{} = {} {}, {}", n(dest), op, n(lhs), n(rhs))
            }
            Inst::Unary { op, dest, src } => format!("{} = {} {}", n(dest), op, n(src)),
            Inst::Call { closure, args } => format!("call {}({})", n(closure), self.names(args)),
            Inst::AllocClosure { function, refs } => {
                format!("alloc_closure {} [{}]", n(function), self.names(refs))
            }
            Inst::Return { value } => format!("return {}", n(value)),
            Inst::Label { label } => format!("{}:", label),
            Inst::Jump { label } => format!("jump {}", label),
            Inst::ShortJump { label } => format!("jump.s {}", label),
            Inst::CondJump { cond, label } => format!("if {} jump {}", n(cond), label),
            Inst::CallHelper(helper) => match helper {
                HelperCall::GarbageCollect => "gc".to_string(),
                HelperCall::AllocRecord => "alloc_record".to_string(),
                HelperCall::FieldLoad { field, record } => {
                    format!("field_load {}.{}", n(record), field)
                }
                HelperCall::FieldStore {
                    field,
                    record,
                    value,
                } => format!("field_store {}.{} <- {}", n(record), field, n(value)),
                HelperCall::IndexLoad { record, index } => {
                    format!("index_load {}[{}]", n(record), n(index))
                }
                HelperCall::IndexStore {
                    record,
                    index,
                    value,
                } => format!("index_store {}[{}] <- {}", n(record), n(index), n(value)),
                HelperCall::ThrowUninitialized { name } => {
                    format!("throw_uninitialized {}", name)
                }
            },
            Inst::CallAssert { kind, arg } => format!("{} {}", kind, n(arg)),
            Inst::Fork { src, dest1, dest2 } => {
                format!("{}, {} = fork {}", n(dest1), n(dest2), n(src))
            }
        }
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} ({} params)", self.name, self.parameter_count)?;
        for (pos, inst) in self.iter() {
            writeln!(f, "{:4}  {}", pos, self.format_inst(inst))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_hints() {
        let int = TypeHints::INT;
        assert!(int.is(TypeHints::INT));
        assert!(int.may_be(TypeHints::INT));
        assert!(!int.may_be(TypeHints::BOOL));
        let mixed = int.union(TypeHints::BOOL);
        assert!(!mixed.is(TypeHints::INT));
        assert!(mixed.may_be(TypeHints::BOOL));
        assert!(TypeHints::empty().may_be(TypeHints::STRING));
        assert_eq!(mixed.to_string(), "int|bool");
        assert_eq!(TypeHints::empty().to_string(), "?");
    }

    #[test]
    fn test_constant_operand_carries_hints() {
        let mut func = IrFunction::new("f");
        let c = func.constant(Constant::Integer(3));
        assert!(func.operand(c).is_int());
        assert!(func.operand(c).is_const());
        assert_eq!(func.operand_name(c), "$3");
    }

    #[test]
    fn test_locations_are_interned() {
        let mut func = IrFunction::new("f");
        let a = func.location(OperandKind::Glob(1)).unwrap();
        let b = func.location(OperandKind::Glob(1)).unwrap();
        let c = func.location(OperandKind::Deref(1)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(func.location(OperandKind::Temp(0)).is_err());
        assert_eq!(func.var(2), func.var(2));
    }

    #[test]
    fn test_parameters_start_unknown() {
        let mut func = IrFunction::new("f");
        func.parameter_count = 1;
        let param = func.var(0);
        let local = func.var(1);
        assert_eq!(func.operand(param).types, TypeHints::ANY);
        assert!(func.operand(local).types.is_empty());
    }

    #[test]
    fn test_instruction_defs_and_uses() {
        let mut func = IrFunction::new("f");
        let (a, b, c) = (func.new_temp(), func.new_temp(), func.new_temp());
        let inst = Inst::Binary {
            op: BinOp::Sub,
            dest: c,
            lhs: a,
            rhs: b,
        };
        assert_eq!(inst.defs(), vec![c]);
        assert_eq!(inst.uses(), vec![a, b]);

        let mut store = Inst::CallHelper(HelperCall::IndexStore {
            record: a,
            index: b,
            value: c,
        });
        assert!(store.defs().is_empty());
        for operand in store.uses_mut() {
            *operand = a;
        }
        assert_eq!(store.uses(), vec![a, a, a]);
    }

    #[test]
    fn test_remove_then_compact_reindexes_labels() {
        let mut func = IrFunction::new("f");
        let t = func.new_temp();
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: t, src: one });
        func.push(Inst::Label { label: LabelId(0) });
        func.push(Inst::Return { value: t });
        assert_eq!(func.label_position(LabelId(0)).unwrap(), 1);

        func.remove(0);
        assert!(func.is_removed(0));
        assert_eq!(func.iter().count(), 2);
        assert!(func.insert(0, Inst::Label { label: LabelId(1) }).is_err());

        assert_eq!(func.compact(), 1);
        assert_eq!(func.len(), 2);
        assert_eq!(func.label_position(LabelId(0)).unwrap(), 0);
        assert!(matches!(func.inst(1), Inst::Return { .. }));
        assert!(func.label_position(LabelId(7)).is_err());
    }

    #[test]
    fn test_display() {
        let mut func = IrFunction::new("main");
        func.var_names = vec!["x".into()];
        let x = func.var(0);
        let t = func.new_temp();
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: t, src: one });
        func.push(Inst::Store { dest: x, src: t });
        let text = func.to_string();
        assert!(text.contains("t0 = $1"));
        assert!(text.contains("%x <- t0"));
    }
}
