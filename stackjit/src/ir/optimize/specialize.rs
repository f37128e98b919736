//! Replace generic operations by their fast forms once operand types are
//! proven.

use tracing::trace;

use super::PassContext;
use crate::error::Result;
use crate::ir::types::*;

pub fn specialize_types(func: &mut IrFunction, ctx: &mut PassContext) -> Result<()> {
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        let Inst::Binary { op, dest, lhs, rhs } = func.inst(pos).clone() else {
            continue;
        };
        let (l, r) = (func.operand(lhs), func.operand(rhs));
        let fast = match op {
            BinOp::Add if l.is_int() && r.is_int() => BinOp::IntAdd,
            BinOp::Eq if (l.is_int() && r.is_int()) || (l.is_bool() && r.is_bool()) => {
                BinOp::FastEq
            }
            _ => continue,
        };
        trace!(pos, from = %op, to = %fast, "specialized");
        func.add_types(dest, fast.result_hint());
        func.replace(
            pos,
            Inst::Binary {
                op: fast,
                dest,
                lhs,
                rhs,
            },
        );
        ctx.stats.specialized += 1;
    }
    Ok(())
}
