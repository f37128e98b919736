//! Constant folding.
//!
//! Operations whose operands all carry a constant hint are replaced by an
//! `Assign` of the result. The operands become obsolete, which lets the sweep
//! delete their definitions and the assertions guarding them.

use tracing::trace;

use super::PassContext;
use crate::bytecode::Constant;
use crate::error::{CompileError, Result};
use crate::ir::types::*;
use crate::value::wrap_int;

pub fn fold_constants(func: &mut IrFunction, ctx: &mut PassContext) -> Result<()> {
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        let (dest, sources, folded) = match func.inst(pos) {
            Inst::Binary { op, dest, lhs, rhs } => {
                let (l, r) = (func.operand(*lhs).constant.clone(), func.operand(*rhs).constant.clone());
                let (Some(l), Some(r)) = (l, r) else {
                    continue;
                };
                (*dest, vec![*lhs, *rhs], fold_binop(*op, &l, &r))
            }
            Inst::Unary { op, dest, src } => {
                let Some(value) = func.operand(*src).constant.clone() else {
                    continue;
                };
                (*dest, vec![*src], fold_unop(*op, &value))
            }
            _ => continue,
        };

        let value = match folded {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(err) => {
                ctx.report(err)?;
                continue;
            }
        };

        trace!(pos, value = %value, "folded");
        let src = func.constant(value.clone());
        func.add_types(dest, TypeHints::of_constant(&value));
        func.operand_mut(dest).constant = Some(value);
        func.replace(pos, Inst::Assign { dest, src });
        for source in sources {
            ctx.mark_obsolete(source);
        }
        ctx.stats.folded += 1;
    }
    Ok(())
}

fn int(value: &Constant) -> Result<i64> {
    match value {
        Constant::Integer(n) => Ok(*n),
        other => Err(CompileError::IllegalCast {
            message: format!("value {} is not an int", other),
        }),
    }
}

fn boolean(value: &Constant) -> Result<bool> {
    match value {
        Constant::Boolean(b) => Ok(*b),
        other => Err(CompileError::IllegalCast {
            message: format!("value {} is not a bool", other),
        }),
    }
}

/// Result of `l op r`, or `None` when the runtime helper must decide
pub fn fold_binop(op: BinOp, l: &Constant, r: &Constant) -> Result<Option<Constant>> {
    let value = match op {
        BinOp::Add => match (l, r) {
            (Constant::Integer(a), Constant::Integer(b)) => {
                Constant::Integer(wrap_int(a.wrapping_add(*b)))
            }
            (Constant::String(a), Constant::String(b)) => Constant::String(format!("{}{}", a, b)),
            _ => return Ok(None),
        },
        BinOp::IntAdd => Constant::Integer(wrap_int(int(l)?.wrapping_add(int(r)?))),
        BinOp::Sub => Constant::Integer(wrap_int(int(l)?.wrapping_sub(int(r)?))),
        BinOp::Mul => Constant::Integer(wrap_int(int(l)?.wrapping_mul(int(r)?))),
        BinOp::Div => {
            let (a, b) = (int(l)?, int(r)?);
            if b == 0 {
                return Err(CompileError::IllegalArithmetic {
                    message: "divide by zero".into(),
                });
            }
            Constant::Integer(wrap_int(a.wrapping_div(b)))
        }
        BinOp::Gt => Constant::Boolean(int(l)? > int(r)?),
        BinOp::Geq => Constant::Boolean(int(l)? >= int(r)?),
        BinOp::Eq | BinOp::FastEq => Constant::Boolean(l == r),
        BinOp::And => Constant::Boolean(boolean(l)? && boolean(r)?),
        BinOp::Or => Constant::Boolean(boolean(l)? || boolean(r)?),
    };
    Ok(Some(value))
}

pub fn fold_unop(op: UnOp, value: &Constant) -> Result<Option<Constant>> {
    let value = match op {
        UnOp::Neg => Constant::Integer(wrap_int(int(value)?.wrapping_neg())),
        UnOp::Not => Constant::Boolean(!boolean(value)?),
    };
    Ok(Some(value))
}
