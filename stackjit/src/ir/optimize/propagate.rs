//! Type and constant propagation.
//!
//! Solves a small dataflow problem over the instruction list: each temp and
//! variable gets the set of types it may hold, starting from nothing and
//! growing until no instruction changes it. Values the function does not own
//! (globals, closure cells, call results, parameters) may hold anything.
//! The solution is then added to the operands' hints, which never shrink.

use std::collections::HashMap;

use tracing::trace;

use super::PassContext;
use crate::error::Result;
use crate::ir::types::*;

pub fn propagate_types(func: &mut IrFunction, _ctx: &mut PassContext) -> Result<()> {
    let mut types: HashMap<OperandId, TypeHints> = HashMap::new();
    for var in func.vars() {
        if let Some(n) = func.operand(var).slot() {
            if n < func.parameter_count {
                types.insert(var, TypeHints::ANY);
            }
        }
    }

    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut changed = false;
        for (_, inst) in func.iter() {
            match inst {
                Inst::Assign { dest, src } => {
                    let t = source_types(func, &types, *src);
                    changed |= merge(&mut types, *dest, t);
                }
                Inst::Store { dest, src } if func.is_var(*dest) => {
                    let t = get(&types, *src);
                    changed |= merge(&mut types, *dest, t);
                }
                Inst::ForceLoad { var } => {
                    changed |= merge(&mut types, *var, TypeHints::ANY);
                }
                Inst::Fork { src, dest1, dest2 } => {
                    let t = get(&types, *src);
                    changed |= merge(&mut types, *dest1, t);
                    changed |= merge(&mut types, *dest2, t);
                }
                Inst::Binary { op, dest, lhs, rhs } => {
                    let t = binary_result(*op, get(&types, *lhs), get(&types, *rhs));
                    changed |= merge(&mut types, *dest, t);
                }
                Inst::Unary { op, dest, .. } => {
                    changed |= merge(&mut types, *dest, op.result_hint());
                }
                _ => {}
            }
        }
        if !changed {
            break;
        }
    }
    trace!(rounds, "type propagation converged");

    for (id, t) in types {
        func.add_types(id, t);
    }
    propagate_constants(func);
    Ok(())
}

fn get(types: &HashMap<OperandId, TypeHints>, id: OperandId) -> TypeHints {
    types.get(&id).copied().unwrap_or_default()
}

fn merge(types: &mut HashMap<OperandId, TypeHints>, id: OperandId, t: TypeHints) -> bool {
    if t.is_empty() {
        return false;
    }
    let entry = types.entry(id).or_default();
    let merged = entry.union(t);
    let changed = merged != *entry;
    *entry = merged;
    changed
}

fn source_types(
    func: &IrFunction,
    types: &HashMap<OperandId, TypeHints>,
    src: OperandId,
) -> TypeHints {
    match &func.operand(src).kind {
        OperandKind::Const(c) => TypeHints::of_constant(c),
        OperandKind::Temp(_) | OperandKind::Var(_) => get(types, src),
        OperandKind::Function(_) | OperandKind::Ref(_) => TypeHints::OBJECT,
        // Written by other code
        OperandKind::Glob(_) | OperandKind::Deref(_) | OperandKind::RetVal => TypeHints::ANY,
    }
}

/// Result types of `op`; nothing while an operand is still unknown
fn binary_result(op: BinOp, lhs: TypeHints, rhs: TypeHints) -> TypeHints {
    match op {
        BinOp::Add if lhs.is_empty() || rhs.is_empty() => TypeHints::empty(),
        BinOp::Add if lhs.is(TypeHints::INT) && rhs.is(TypeHints::INT) => TypeHints::INT,
        // Integer addition or string concatenation
        BinOp::Add => TypeHints::INT.union(TypeHints::STRING),
        _ => op.result_hint(),
    }
}

/// Copy literal values along `Assign` chains into temps
fn propagate_constants(func: &mut IrFunction) {
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        if let Inst::Assign { dest, src } = func.inst(pos) {
            let (dest, src) = (*dest, *src);
            if !func.is_temp(dest) || func.operand(dest).is_const() {
                continue;
            }
            let constant = match &func.operand(src).kind {
                OperandKind::Const(_) | OperandKind::Temp(_) => func.operand(src).constant.clone(),
                _ => None,
            };
            if constant.is_some() {
                func.operand_mut(dest).constant = constant;
            }
        }
    }
}
