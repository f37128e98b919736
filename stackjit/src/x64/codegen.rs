//! IR to x64 Code Generation
//!
//! Walks a register-allocated [`IrFunction`] once and emits machine code for
//! each instruction. Values move through `rax`, with `rcx` and `rdx` as
//! second operands; everything the allocator placed in a register is read
//! and written there directly.
//!
//! ## Frame
//!
//! ```text
//! [rbp - 8]        closure
//! [rbp - 16]       locals array
//! [rbp - 24]       reference array
//! [rbp - 32 - 8n]  temp n
//! ```
//!
//! Spilled variables live in the locals array. The compiled entry point is
//! `fn(closure, locals, refs) -> value` under the System V convention.

use std::collections::BTreeSet;

use tracing::debug;

use super::assembler::Assembler;
use super::encoding::Cond;
use super::helpers::{HelperTable, RuntimeHelper};
use super::registers::{Reg64, HELPER_ARG_REGS, RET_REG, SAVED_POOL_REGS};
use crate::bytecode::Constant;
use crate::error::{CompileError, Result};
use crate::ir::{AssertKind, BinOp, HelperCall, Inst, IrFunction, OperandId, OperandKind, UnOp};
use crate::value::{encode_bool, encode_int, wrap_int, BOOLEAN_PAYLOAD_BIT, FALSE, NONE, TRUE};

/// A load the loader must patch before the code runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    /// 8-byte address of a runtime helper at `offset`
    Helper { offset: usize, helper: RuntimeHelper },
    /// 8-byte pointer to the heap string `strings[index]` at `offset`
    StringConstant { offset: usize, index: usize },
}

/// Generated code for one function
#[derive(Debug, Clone)]
pub struct NativeFunction {
    pub name: String,
    pub code: Vec<u8>,
    /// Intel-syntax listing
    pub listing: Vec<String>,
    pub relocations: Vec<Relocation>,
    /// String constants referenced by [`Relocation::StringConstant`]
    pub strings: Vec<String>,
    /// Bytes reserved below `rbp`
    pub frame_size: i32,
}

/// Fixed slots of the stack frame
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout {
    pub frame_size: i32,
}

impl FrameLayout {
    pub const CLOSURE: i32 = -8;
    pub const LOCALS: i32 = -16;
    pub const REFS: i32 = -24;

    pub fn new(num_temps: usize) -> Self {
        let mut frame_size = 8 * (3 + num_temps as i32);
        // Return address, rbp and five callee-saved pushes leave rsp aligned
        // only when the frame is 8 mod 16
        if (frame_size + 40) % 16 != 0 {
            frame_size += 8;
        }
        Self { frame_size }
    }

    pub fn temp(n: usize) -> i32 {
        -8 * (4 + n as i32)
    }
}

/// Argument of a helper call
#[derive(Debug, Clone, Copy)]
enum Arg {
    Value(OperandId),
    /// Value currently in `rax`
    Result,
    Imm(u64),
    Closure,
    FramePointer,
    /// The cell of closure reference `n`
    RefCell(usize),
    /// Arguments pushed on the stack for this call
    StackPointer,
}

pub struct X64Codegen<'a> {
    func: &'a IrFunction,
    helpers: &'a HelperTable,
    asm: Assembler,
    relocations: Vec<Relocation>,
    strings: Vec<String>,
    layout: FrameLayout,
}

/// Generate native code for an allocated function
pub fn generate(func: &IrFunction, helpers: &HelperTable) -> Result<NativeFunction> {
    X64Codegen::new(func, helpers).run()
}

impl<'a> X64Codegen<'a> {
    pub fn new(func: &'a IrFunction, helpers: &'a HelperTable) -> Self {
        Self {
            func,
            helpers,
            asm: Assembler::new(),
            relocations: Vec::new(),
            strings: Vec::new(),
            layout: FrameLayout::new(func.num_temps()),
        }
    }

    pub fn run(mut self) -> Result<NativeFunction> {
        self.emit_prologue();

        let func = self.func;
        let mut returned = false;
        for (pos, inst) in func.iter() {
            self.asm.comment(func.format_inst(inst));
            self.emit_inst(pos, inst)?;
            returned = matches!(inst, Inst::Return { .. });
        }
        if !returned {
            self.asm.mov_imm(RET_REG, NONE);
            self.emit_epilogue();
        }

        let (code, listing) = self.asm.finish()?;
        debug!(
            function = %self.func.name,
            bytes = code.len(),
            relocations = self.relocations.len(),
            "generated native code"
        );
        Ok(NativeFunction {
            name: self.func.name.clone(),
            code,
            listing,
            relocations: self.relocations,
            strings: self.strings,
            frame_size: self.layout.frame_size,
        })
    }

    // ==================== Frame ====================

    fn emit_prologue(&mut self) {
        self.asm.push(Reg64::RBP);
        self.asm.mov(Reg64::RBP, Reg64::RSP);
        self.asm.sub_imm(Reg64::RSP, self.layout.frame_size);
        self.asm.store(Reg64::RBP, FrameLayout::CLOSURE, Reg64::RDI);
        self.asm.store(Reg64::RBP, FrameLayout::LOCALS, Reg64::RSI);
        self.asm.store(Reg64::RBP, FrameLayout::REFS, Reg64::RDX);
        for reg in SAVED_POOL_REGS {
            self.asm.push(reg);
        }
    }

    fn emit_epilogue(&mut self) {
        for &reg in SAVED_POOL_REGS.iter().rev() {
            self.asm.pop(reg);
        }
        self.asm.leave();
        self.asm.ret();
    }

    // ==================== Operands ====================

    fn unexpected(&self, id: OperandId, context: &str) -> CompileError {
        CompileError::unexpected_operand(self.func.operand_name(id), context)
    }

    /// Load a value that needs no helper call into `dst`
    fn load(&mut self, dst: Reg64, id: OperandId) -> Result<()> {
        let func = self.func;
        let operand = func.operand(id);
        match &operand.kind {
            OperandKind::Temp(n) => match operand.reg {
                Some(reg) => self.asm.mov(dst, reg),
                None => self.asm.load(dst, Reg64::RBP, FrameLayout::temp(*n)),
            },
            OperandKind::Var(n) => match operand.reg {
                Some(reg) => self.asm.mov(dst, reg),
                None => {
                    self.asm.load(dst, Reg64::RBP, FrameLayout::LOCALS);
                    self.asm.load(dst, dst, 8 * *n as i32);
                }
            },
            OperandKind::Ref(n) => {
                self.asm.load(dst, Reg64::RBP, FrameLayout::REFS);
                self.asm.load(dst, dst, 8 * *n as i32);
            }
            OperandKind::Const(constant) => self.load_constant(dst, constant),
            OperandKind::RetVal => self.asm.mov(dst, RET_REG),
            OperandKind::Glob(_) | OperandKind::Deref(_) | OperandKind::Function(_) => {
                return Err(self.unexpected(id, "register load"));
            }
        }
        Ok(())
    }

    fn load_constant(&mut self, dst: Reg64, constant: &Constant) {
        match constant {
            Constant::None => self.asm.mov_imm(dst, NONE),
            Constant::Boolean(b) => self.asm.mov_imm(dst, encode_bool(*b)),
            Constant::Integer(n) => self.asm.mov_imm(dst, encode_int(wrap_int(*n))),
            Constant::String(s) => {
                let index = match self.strings.iter().position(|known| known == s) {
                    Some(index) => index,
                    None => {
                        self.strings.push(s.clone());
                        self.strings.len() - 1
                    }
                };
                let symbol = format!("str{}", index);
                let offset = self.asm.mov_imm64(dst, 0, Some(&symbol));
                self.relocations
                    .push(Relocation::StringConstant { offset, index });
            }
        }
    }

    /// Read any operand into `rax`, calling a helper where the value lives
    /// in the runtime
    fn read(&mut self, pos: usize, id: OperandId) -> Result<()> {
        match *self.func.kind(id) {
            OperandKind::Glob(n) => {
                self.call_helper(pos, RuntimeHelper::ReadGlobal, &[Arg::Closure, Arg::Imm(n as u64)])
            }
            OperandKind::Deref(n) => {
                self.call_helper(pos, RuntimeHelper::ReadReference, &[Arg::RefCell(n)])
            }
            OperandKind::Function(n) => self.call_helper(
                pos,
                RuntimeHelper::ReadFunction,
                &[Arg::Closure, Arg::Imm(n as u64)],
            ),
            _ => self.load(RET_REG, id),
        }
    }

    /// Write `rax` into a temp, variable, global or closure cell
    fn write(&mut self, pos: usize, id: OperandId) -> Result<()> {
        let func = self.func;
        let operand = func.operand(id);
        match operand.kind {
            OperandKind::Temp(n) => match operand.reg {
                Some(reg) => self.asm.mov(reg, RET_REG),
                None => self.asm.store(Reg64::RBP, FrameLayout::temp(n), RET_REG),
            },
            OperandKind::Var(n) => match operand.reg {
                Some(reg) => self.asm.mov(reg, RET_REG),
                None => {
                    self.asm.load(Reg64::RCX, Reg64::RBP, FrameLayout::LOCALS);
                    self.asm.store(Reg64::RCX, 8 * n as i32, RET_REG);
                }
            },
            OperandKind::Glob(n) => {
                return self.call_helper(
                    pos,
                    RuntimeHelper::WriteGlobal,
                    &[Arg::Closure, Arg::Imm(n as u64), Arg::Result],
                );
            }
            OperandKind::Deref(n) => {
                return self.call_helper(
                    pos,
                    RuntimeHelper::WriteReference,
                    &[Arg::RefCell(n), Arg::Result],
                );
            }
            _ => return Err(self.unexpected(id, "store destination")),
        }
        Ok(())
    }

    // ==================== Calls ====================

    /// Pool registers holding values that live across `pos`
    fn live_caller_saved(&self, pos: usize) -> BTreeSet<Reg64> {
        self.func
            .operand_ids()
            .map(|id| self.func.operand(id))
            .filter(|op| op.has_live_range() && op.live_start < pos)
            .filter(|op| !op.is_dead() && op.live_end > pos)
            .filter_map(|op| op.reg)
            .filter(|reg| reg.is_caller_saved())
            .collect()
    }

    fn call_helper(&mut self, pos: usize, helper: RuntimeHelper, args: &[Arg]) -> Result<()> {
        self.call_helper_with_stack(pos, helper, args, &[])
    }

    /// Call `helper`, first pushing `stack` so that `stack[0]` ends up at
    /// `[rsp]`. The result is left in `rax`.
    fn call_helper_with_stack(
        &mut self,
        pos: usize,
        helper: RuntimeHelper,
        args: &[Arg],
        stack: &[OperandId],
    ) -> Result<()> {
        if args.len() > HELPER_ARG_REGS.len() {
            return Err(CompileError::InvalidNumArgs {
                count: args.len(),
                max: HELPER_ARG_REGS.len(),
            });
        }

        let saved: Vec<Reg64> = self.live_caller_saved(pos).into_iter().collect();
        for &reg in &saved {
            self.asm.push(reg);
        }
        let padded = (saved.len() + stack.len()) % 2 == 1;
        if padded {
            self.asm.sub_imm(Reg64::RSP, 8);
        }
        for &value in stack.iter().rev() {
            self.load(Reg64::RCX, value)?;
            self.asm.push(Reg64::RCX);
        }

        // Arguments only read rax, so it is loaded last
        let order = args
            .iter()
            .zip(HELPER_ARG_REGS.iter())
            .filter(|(arg, _)| !matches!(arg, Arg::Result))
            .chain(
                args.iter()
                    .zip(HELPER_ARG_REGS.iter())
                    .filter(|(arg, _)| matches!(arg, Arg::Result)),
            );
        for (arg, &reg) in order {
            match *arg {
                Arg::Value(id) => self.load(reg, id)?,
                Arg::Result => self.asm.mov(reg, RET_REG),
                Arg::Imm(imm) => self.asm.mov_imm(reg, imm),
                Arg::Closure => self.asm.load(reg, Reg64::RBP, FrameLayout::CLOSURE),
                Arg::FramePointer => self.asm.mov(reg, Reg64::RBP),
                Arg::RefCell(n) => {
                    self.asm.load(reg, Reg64::RBP, FrameLayout::REFS);
                    self.asm.load(reg, reg, 8 * n as i32);
                }
                Arg::StackPointer => self.asm.mov(reg, Reg64::RSP),
            }
        }

        let offset = self
            .asm
            .mov_imm64(RET_REG, self.helpers.address(helper), Some(helper.name()));
        self.relocations.push(Relocation::Helper { offset, helper });
        self.asm.call(RET_REG);

        let cleanup = 8 * (stack.len() + usize::from(padded));
        if cleanup > 0 {
            self.asm.add_imm(Reg64::RSP, cleanup as i32);
        }
        for &reg in saved.iter().rev() {
            self.asm.pop(reg);
        }
        Ok(())
    }

    // ==================== Instructions ====================

    fn emit_inst(&mut self, pos: usize, inst: &Inst) -> Result<()> {
        match inst {
            Inst::Assign { dest, src } => {
                let func = self.func;
                let (d, s) = (func.operand(*dest), func.operand(*src));
                if d.reg.is_some() && d.reg == s.reg {
                    // shares the variable's register
                    return Ok(());
                }
                self.read(pos, *src)?;
                self.write(pos, *dest)
            }
            Inst::Store { dest, src } => {
                self.load(RET_REG, *src)?;
                self.write(pos, *dest)
            }
            Inst::ForceLoad { var } => {
                let func = self.func;
                let operand = func.operand(*var);
                if let (Some(reg), OperandKind::Var(n)) = (operand.reg, &operand.kind) {
                    self.asm.load(Reg64::RCX, Reg64::RBP, FrameLayout::LOCALS);
                    self.asm.load(reg, Reg64::RCX, 8 * *n as i32);
                }
                Ok(())
            }
            Inst::Binary { op, dest, lhs, rhs } => {
                self.emit_binary(pos, *op, *lhs, *rhs)?;
                self.write(pos, *dest)
            }
            Inst::Unary { op, dest, src } => {
                self.load(RET_REG, *src)?;
                match op {
                    UnOp::Neg => self.asm.neg(RET_REG),
                    UnOp::Not => self.asm.xor_imm(RET_REG, BOOLEAN_PAYLOAD_BIT as i32),
                }
                self.write(pos, *dest)
            }
            Inst::Call { closure, args } => self.call_helper_with_stack(
                pos,
                RuntimeHelper::CallFunction,
                &[Arg::Value(*closure), Arg::StackPointer, Arg::Imm(args.len() as u64)],
                args,
            ),
            Inst::AllocClosure { function, refs } => self.call_helper_with_stack(
                pos,
                RuntimeHelper::AllocClosure,
                &[Arg::Value(*function), Arg::StackPointer, Arg::Imm(refs.len() as u64)],
                refs,
            ),
            Inst::Return { value } => {
                self.load(RET_REG, *value)?;
                self.emit_epilogue();
                Ok(())
            }
            Inst::Label { label } => {
                self.asm.bind(*label);
                Ok(())
            }
            Inst::Jump { label } => {
                self.asm.jmp(*label);
                Ok(())
            }
            Inst::ShortJump { label } => {
                self.asm.jmp_short(*label);
                Ok(())
            }
            Inst::CondJump { cond, label } => {
                self.load(RET_REG, *cond)?;
                self.asm.cmp_imm(RET_REG, TRUE as i32);
                self.asm.je(*label);
                Ok(())
            }
            Inst::CallHelper(helper) => self.emit_helper(pos, helper),
            Inst::CallAssert { kind, arg } => {
                let helper = match kind {
                    AssertKind::Int => RuntimeHelper::AssertInt,
                    AssertKind::NotZero => RuntimeHelper::AssertNotZero,
                    AssertKind::Bool => RuntimeHelper::AssertBool,
                };
                self.call_helper(pos, helper, &[Arg::Value(*arg)])
            }
            Inst::Fork { src, dest1, dest2 } => {
                self.load(RET_REG, *src)?;
                self.write(pos, *dest1)?;
                self.write(pos, *dest2)
            }
        }
    }

    /// Compute `lhs op rhs` into `rax`
    fn emit_binary(&mut self, pos: usize, op: BinOp, lhs: OperandId, rhs: OperandId) -> Result<()> {
        let values = [Arg::Value(lhs), Arg::Value(rhs)];
        match op {
            BinOp::Add => self.call_helper(pos, RuntimeHelper::Add, &values),
            BinOp::Eq => self.call_helper(pos, RuntimeHelper::Equals, &values),
            BinOp::IntAdd => self.emit_inline(lhs, rhs, |asm| asm.add(RET_REG, Reg64::RCX)),
            BinOp::Sub => self.emit_inline(lhs, rhs, |asm| asm.sub(RET_REG, Reg64::RCX)),
            BinOp::Mul => self.emit_inline(lhs, rhs, |asm| {
                asm.sar(RET_REG, 3);
                asm.imul(RET_REG, Reg64::RCX);
            }),
            BinOp::Div => self.emit_inline(lhs, rhs, |asm| {
                asm.cqo();
                asm.idiv(Reg64::RCX);
                asm.shl(RET_REG, 3);
            }),
            BinOp::Gt => self.emit_inline(lhs, rhs, |asm| compare(asm, Cond::Greater)),
            BinOp::Geq => self.emit_inline(lhs, rhs, |asm| compare(asm, Cond::GreaterEqual)),
            BinOp::FastEq => self.emit_inline(lhs, rhs, |asm| compare(asm, Cond::Equal)),
            BinOp::And => self.emit_inline(lhs, rhs, |asm| asm.and(RET_REG, Reg64::RCX)),
            BinOp::Or => self.emit_inline(lhs, rhs, |asm| asm.or(RET_REG, Reg64::RCX)),
        }
    }

    /// Load `lhs` into `rax` and `rhs` into `rcx`, then run `emit`
    fn emit_inline(
        &mut self,
        lhs: OperandId,
        rhs: OperandId,
        emit: impl FnOnce(&mut Assembler),
    ) -> Result<()> {
        self.load(Reg64::RCX, rhs)?;
        self.load(RET_REG, lhs)?;
        emit(&mut self.asm);
        Ok(())
    }

    fn emit_helper(&mut self, pos: usize, helper: &HelperCall) -> Result<()> {
        match *helper {
            HelperCall::GarbageCollect => {
                self.call_helper(pos, RuntimeHelper::GarbageCollect, &[Arg::FramePointer])
            }
            HelperCall::AllocRecord => self.call_helper(pos, RuntimeHelper::AllocRecord, &[]),
            HelperCall::FieldLoad { field, record } => self.call_helper(
                pos,
                RuntimeHelper::FieldLoad,
                &[Arg::Closure, Arg::Value(record), Arg::Imm(field as u64)],
            ),
            HelperCall::FieldStore {
                field,
                record,
                value,
            } => self.call_helper(
                pos,
                RuntimeHelper::FieldStore,
                &[
                    Arg::Closure,
                    Arg::Value(record),
                    Arg::Imm(field as u64),
                    Arg::Value(value),
                ],
            ),
            HelperCall::IndexLoad { record, index } => self.call_helper(
                pos,
                RuntimeHelper::IndexLoad,
                &[Arg::Value(record), Arg::Value(index)],
            ),
            HelperCall::IndexStore {
                record,
                index,
                value,
            } => self.call_helper(
                pos,
                RuntimeHelper::IndexStore,
                &[Arg::Value(record), Arg::Value(index), Arg::Value(value)],
            ),
            HelperCall::ThrowUninitialized { name } => self.call_helper(
                pos,
                RuntimeHelper::ThrowUninitialized,
                &[Arg::Closure, Arg::Imm(name as u64)],
            ),
        }
    }
}

/// Tagged boolean of `rax cond rcx` into `rax`
fn compare(asm: &mut Assembler, cond: Cond) {
    asm.cmp(RET_REG, Reg64::RCX);
    asm.mov_imm(RET_REG, FALSE);
    asm.mov_imm(Reg64::RDX, TRUE);
    asm.cmov(cond, RET_REG, Reg64::RDX);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::LabelId;

    fn count(native: &NativeFunction, needle: &str) -> usize {
        native
            .listing
            .iter()
            .filter(|line| line.trim_end().ends_with(needle))
            .count()
    }

    #[test]
    fn test_frame_layout_alignment() {
        assert_eq!(FrameLayout::new(0).frame_size, 24);
        assert_eq!(FrameLayout::new(1).frame_size, 40);
        assert_eq!(FrameLayout::new(2).frame_size, 40);
        assert_eq!(FrameLayout::temp(0), -32);
        assert_eq!(FrameLayout::temp(3), -56);
    }

    #[test]
    fn test_empty_function_returns_none() {
        let func = IrFunction::new("f");
        let native = generate(&func, &HelperTable::new()).unwrap();
        assert_eq!(native.code.first(), Some(&0x55)); // push rbp
        assert_eq!(native.code.last(), Some(&0xC3)); // ret
        assert_eq!(count(&native, "mov rax, 0x2"), 1);
        assert!(native.relocations.is_empty());
    }

    #[test]
    fn test_helper_address_is_relocated() {
        let mut func = IrFunction::new("f");
        let (a, b, c) = (func.new_temp(), func.new_temp(), func.new_temp());
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: a, src: one });
        func.push(Inst::Assign { dest: b, src: one });
        func.push(Inst::Binary {
            op: BinOp::Add,
            dest: c,
            lhs: a,
            rhs: b,
        });
        func.push(Inst::Return { value: c });

        let helpers = HelperTable::new().with(RuntimeHelper::Add, 0x1122_3344_5566_7788);
        let native = generate(&func, &helpers).unwrap();
        let offset = match native.relocations.as_slice() {
            [Relocation::Helper {
                offset,
                helper: RuntimeHelper::Add,
            }] => *offset,
            other => panic!("unexpected relocations {:?}", other),
        };
        assert_eq!(
            &native.code[offset..offset + 8],
            &0x1122_3344_5566_7788u64.to_le_bytes()
        );
        assert_eq!(count(&native, "call rax"), 1);
    }

    #[test]
    fn test_string_constants_are_shared() {
        let mut func = IrFunction::new("f");
        let (a, b) = (func.new_temp(), func.new_temp());
        let hi = func.constant(Constant::String("hi".to_string()));
        func.push(Inst::Assign { dest: a, src: hi });
        func.push(Inst::Assign { dest: b, src: hi });
        func.push(Inst::Return { value: b });

        let native = generate(&func, &HelperTable::new()).unwrap();
        assert_eq!(native.strings, vec!["hi".to_string()]);
        assert_eq!(native.relocations.len(), 2);
        assert!(native
            .relocations
            .iter()
            .all(|r| matches!(r, Relocation::StringConstant { index: 0, .. })));
    }

    #[test]
    fn test_live_caller_saved_register_survives_call() {
        let mut func = IrFunction::new("f");
        let t = func.new_temp();
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: t, src: one }); // 0
        func.push(Inst::CallHelper(HelperCall::GarbageCollect)); // 1
        func.push(Inst::Return { value: t }); // 2
        let op = func.operand_mut(t);
        op.live_start = 0;
        op.live_end = 2;
        op.reg = Some(Reg64::R8);

        let native = generate(&func, &HelperTable::new()).unwrap();
        assert_eq!(count(&native, "push r8"), 1);
        assert_eq!(count(&native, "pop r8"), 1);
        // One save keeps rsp misaligned until padded
        assert_eq!(count(&native, "sub rsp, 8"), 1);
        assert_eq!(count(&native, "add rsp, 8"), 1);
        // Callee-saved registers are only pushed by the prologue
        assert_eq!(count(&native, "push r12"), 1);
    }

    #[test]
    fn test_call_pushes_arguments() {
        let mut func = IrFunction::new("f");
        let (f, x) = (func.new_temp(), func.new_temp());
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: f, src: one });
        func.push(Inst::Assign { dest: x, src: one });
        func.push(Inst::Call {
            closure: f,
            args: vec![x],
        });

        let native = generate(&func, &HelperTable::new()).unwrap();
        assert_eq!(count(&native, "push rcx"), 1);
        assert_eq!(count(&native, "mov rsi, rsp"), 1);
        assert_eq!(count(&native, "mov rdx, 0x1"), 1);
        assert_eq!(count(&native, "add rsp, 16"), 1);
    }

    #[test]
    fn test_short_jump_too_far() {
        let mut func = IrFunction::new("f");
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::ShortJump { label: LabelId(0) });
        for _ in 0..20 {
            let t = func.new_temp();
            func.push(Inst::Assign { dest: t, src: one });
        }
        func.push(Inst::Label { label: LabelId(0) });
        let err = generate(&func, &HelperTable::new()).unwrap_err();
        assert!(matches!(err, CompileError::JumpOutOfRange { width: 8, .. }));
    }

    #[test]
    fn test_too_many_helper_arguments() {
        let func = IrFunction::new("f");
        let helpers = HelperTable::new();
        let mut codegen = X64Codegen::new(&func, &helpers);
        let err = codegen
            .call_helper(0, RuntimeHelper::Add, &[Arg::Imm(0); 5])
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidNumArgs { count: 5, max: 4 }));
    }
}
