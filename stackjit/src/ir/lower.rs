//! Bytecode to IR Lowering
//!
//! Walks one bytecode function and rebuilds its value stack at compile time:
//! every push becomes a fresh temp, every pop hands that temp to the
//! instruction consuming it. Type-sensitive operations get a `CallAssert`
//! for each operand whose type is not yet known; the optimizer removes the
//! ones it can prove redundant.

use tracing::debug;

use super::types::*;
use crate::bytecode::{Function, Instruction, Opcode};
use crate::error::{CompileError, Result};

/// Lower one bytecode function to IR
pub fn lower_function(bytecode: &Function) -> Result<IrFunction> {
    let mut lowerer = Lowerer::new(bytecode);
    for (index, insn) in bytecode.instructions.iter().enumerate() {
        lowerer.lower(index, insn)?;
    }
    lowerer.check_jump_targets()?;
    debug!(
        bytecode = bytecode.instructions.len(),
        ir = lowerer.func.len(),
        temps = lowerer.func.num_temps(),
        "lowered function"
    );
    Ok(lowerer.func)
}

struct Lowerer<'a> {
    bytecode: &'a Function,
    func: IrFunction,
    stack: Vec<OperandId>,
    index: usize,
    opcode: Opcode,
}

impl<'a> Lowerer<'a> {
    fn new(bytecode: &'a Function) -> Self {
        let mut func = IrFunction::new("function");
        func.parameter_count = bytecode.parameter_count;
        func.var_names = bytecode.local_vars.clone();
        func.global_names = bytecode.names.clone();
        func.ref_names = bytecode
            .local_ref_vars
            .iter()
            .chain(bytecode.free_vars.iter())
            .cloned()
            .collect();
        Self {
            bytecode,
            func,
            stack: Vec::new(),
            index: 0,
            opcode: Opcode::Pop,
        }
    }

    // ==================== Stack ====================

    fn pop(&mut self) -> Result<OperandId> {
        self.stack.pop().ok_or_else(|| CompileError::StackUnderflow {
            index: self.index,
            opcode: self.opcode.to_string(),
        })
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<OperandId>> {
        (0..n).map(|_| self.pop()).collect()
    }

    /// Fresh temp pushed onto the stack, hinted with `types`
    fn push_temp(&mut self, types: TypeHints) -> OperandId {
        let temp = self.func.new_temp();
        self.func.add_types(temp, types);
        self.stack.push(temp);
        temp
    }

    /// `Assign` from `src` into a fresh stack temp
    fn push_assign(&mut self, src: OperandId) -> OperandId {
        let dest = self.push_temp(TypeHints::empty());
        self.func.push(Inst::Assign { dest, src });
        dest
    }

    fn push_retval(&mut self) -> Result<OperandId> {
        let retval = self.func.location(OperandKind::RetVal)?;
        Ok(self.push_assign(retval))
    }

    fn assert(&mut self, kind: AssertKind, arg: OperandId) {
        self.func.push(Inst::CallAssert { kind, arg });
    }

    // ==================== Operands ====================

    fn operand(&self, insn: &Instruction) -> Result<i32> {
        insn.operand.ok_or_else(|| {
            CompileError::invalid_operation(format!(
                "`{}` at bytecode instruction {} has no operand",
                insn.op, self.index
            ))
        })
    }

    /// Operand as an index into a table of `len` entries
    fn index_into(&self, insn: &Instruction, table: &'static str, len: usize) -> Result<usize> {
        let n = self.operand(insn)?;
        usize::try_from(n)
            .ok()
            .filter(|&i| i < len)
            .ok_or(CompileError::BadIndex {
                table,
                index: n as i64,
            })
    }

    fn label(&self, insn: &Instruction) -> Result<LabelId> {
        let n = self.operand(insn)?;
        u32::try_from(n).map(LabelId).map_err(|_| CompileError::BadIndex {
            table: "label",
            index: n as i64,
        })
    }

    fn count(&self, insn: &Instruction) -> Result<usize> {
        let n = self.operand(insn)?;
        usize::try_from(n).map_err(|_| {
            CompileError::invalid_operation(format!("`{}` with negative count {}", insn.op, n))
        })
    }

    // ==================== Lowering ====================

    fn lower(&mut self, index: usize, insn: &Instruction) -> Result<()> {
        self.index = index;
        self.opcode = insn.op;
        let bytecode = self.bytecode;

        match insn.op {
            Opcode::LoadConst => {
                let i = self.index_into(insn, "constant", bytecode.constants.len())?;
                let value = self.func.constant(bytecode.constants[i].clone());
                self.push_assign(value);
            }
            Opcode::LoadFunc => {
                let i = self.index_into(insn, "function", bytecode.functions.len())?;
                let function = self.func.location(OperandKind::Function(i))?;
                self.push_assign(function);
            }
            Opcode::LoadLocal => {
                let i = self.index_into(insn, "local", bytecode.local_vars.len())?;
                let var = self.func.var(i);
                let dest = self.push_assign(var);
                self.func.operand_mut(dest).var_alias = Some(var);
            }
            Opcode::StoreLocal => {
                let i = self.index_into(insn, "local", bytecode.local_vars.len())?;
                let src = self.pop()?;
                let var = self.func.var(i);
                self.func.push(Inst::Store { dest: var, src });
            }
            Opcode::LoadGlobal => {
                let i = self.index_into(insn, "global", bytecode.names.len())?;
                let global = self.func.location(OperandKind::Glob(i))?;
                self.push_assign(global);
            }
            Opcode::StoreGlobal => {
                let i = self.index_into(insn, "global", bytecode.names.len())?;
                let src = self.pop()?;
                let global = self.func.location(OperandKind::Glob(i))?;
                self.func.push(Inst::Store { dest: global, src });
            }
            Opcode::PushReference => {
                let i = self.index_into(insn, "reference", bytecode.reference_count())?;
                let cell = self.func.location(OperandKind::Ref(i))?;
                self.push_assign(cell);
            }
            Opcode::LoadReference => {
                let i = self.index_into(insn, "reference", bytecode.reference_count())?;
                let value = self.func.location(OperandKind::Deref(i))?;
                self.push_assign(value);
            }
            Opcode::StoreReference => {
                let i = self.index_into(insn, "reference", bytecode.reference_count())?;
                let src = self.pop()?;
                let cell = self.func.location(OperandKind::Deref(i))?;
                self.func.push(Inst::Store { dest: cell, src });
            }

            Opcode::AllocRecord => {
                self.func.push(Inst::CallHelper(HelperCall::AllocRecord));
                self.push_retval()?;
            }
            Opcode::FieldLoad => {
                let field = self.index_into(insn, "name", bytecode.names.len())?;
                let record = self.pop()?;
                self.func
                    .push(Inst::CallHelper(HelperCall::FieldLoad { field, record }));
                self.push_retval()?;
            }
            Opcode::FieldStore => {
                let field = self.index_into(insn, "name", bytecode.names.len())?;
                let value = self.pop()?;
                let record = self.pop()?;
                self.func.push(Inst::CallHelper(HelperCall::FieldStore {
                    field,
                    record,
                    value,
                }));
            }
            Opcode::IndexLoad => {
                let index = self.pop()?;
                let record = self.pop()?;
                self.func
                    .push(Inst::CallHelper(HelperCall::IndexLoad { record, index }));
                self.push_retval()?;
            }
            Opcode::IndexStore => {
                let value = self.pop()?;
                let index = self.pop()?;
                let record = self.pop()?;
                self.func.push(Inst::CallHelper(HelperCall::IndexStore {
                    record,
                    index,
                    value,
                }));
            }

            Opcode::AllocClosure => {
                let n = self.count(insn)?;
                let function = self.pop()?;
                // Pop order matches the nested function's free variables
                let refs = self.pop_n(n)?;
                self.func.push(Inst::AllocClosure { function, refs });
                self.push_retval()?;
            }
            Opcode::Call => {
                let n = self.count(insn)?;
                let closure = self.pop()?;
                let mut args = self.pop_n(n)?;
                args.reverse();
                self.func.push(Inst::Call { closure, args });
                self.push_retval()?;
            }
            Opcode::Return => {
                let value = self.pop()?;
                self.func.push(Inst::Return { value });
            }

            Opcode::Add => self.generic_binop(BinOp::Add)?,
            Opcode::Eq => self.generic_binop(BinOp::Eq)?,
            Opcode::Sub => self.checked_binop(BinOp::Sub, AssertKind::Int)?,
            Opcode::Mul => self.checked_binop(BinOp::Mul, AssertKind::Int)?,
            Opcode::Div => self.checked_binop(BinOp::Div, AssertKind::Int)?,
            Opcode::Gt => self.checked_binop(BinOp::Gt, AssertKind::Int)?,
            Opcode::Geq => self.checked_binop(BinOp::Geq, AssertKind::Int)?,
            Opcode::And => self.checked_binop(BinOp::And, AssertKind::Bool)?,
            Opcode::Or => self.checked_binop(BinOp::Or, AssertKind::Bool)?,
            Opcode::Neg => self.checked_unop(UnOp::Neg, AssertKind::Int)?,
            Opcode::Not => self.checked_unop(UnOp::Not, AssertKind::Bool)?,

            Opcode::Label => {
                let label = self.label(insn)?;
                if self.func.labels().contains_key(&label) {
                    return Err(CompileError::invalid_operation(format!(
                        "label {} defined twice",
                        label.0
                    )));
                }
                self.func.push(Inst::Label { label });
            }
            Opcode::Goto => {
                let label = self.label(insn)?;
                self.func.push(Inst::Jump { label });
            }
            Opcode::If => {
                let label = self.label(insn)?;
                let cond = self.pop()?;
                self.assert(AssertKind::Bool, cond);
                self.func.push(Inst::CondJump { cond, label });
            }

            Opcode::Dup => {
                let src = self.pop()?;
                let dest1 = self.push_temp(TypeHints::empty());
                let dest2 = self.push_temp(TypeHints::empty());
                self.func.push(Inst::Fork { src, dest1, dest2 });
            }
            Opcode::Swap => {
                let top = self.pop()?;
                let below = self.pop()?;
                self.stack.push(top);
                self.stack.push(below);
            }
            Opcode::Pop => {
                self.pop()?;
            }

            Opcode::GarbageCollect => {
                self.func.push(Inst::CallHelper(HelperCall::GarbageCollect));
            }
            Opcode::ThrowUninitialized => {
                let name = self.index_into(insn, "reference", bytecode.reference_count())?;
                self.func
                    .push(Inst::CallHelper(HelperCall::ThrowUninitialized { name }));
            }
        }
        Ok(())
    }

    /// `add` and `eq`: no assertions, the helper handles every type
    fn generic_binop(&mut self, op: BinOp) -> Result<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let dest = self.push_temp(op.result_hint());
        self.func.push(Inst::Binary { op, dest, lhs, rhs });
        Ok(())
    }

    /// Operators defined on one type only
    fn checked_binop(&mut self, op: BinOp, assert: AssertKind) -> Result<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.assert(assert, lhs);
        self.assert(assert, rhs);
        if op == BinOp::Div {
            self.assert(AssertKind::NotZero, rhs);
        }
        let dest = self.push_temp(op.result_hint());
        self.func.push(Inst::Binary { op, dest, lhs, rhs });
        Ok(())
    }

    fn checked_unop(&mut self, op: UnOp, assert: AssertKind) -> Result<()> {
        let src = self.pop()?;
        self.assert(assert, src);
        let dest = self.push_temp(op.result_hint());
        self.func.push(Inst::Unary { op, dest, src });
        Ok(())
    }

    fn check_jump_targets(&self) -> Result<()> {
        for (_, inst) in self.func.iter() {
            if let Some(label) = inst.jump_target() {
                self.func.label_position(label)?;
            }
        }
        Ok(())
    }
}
