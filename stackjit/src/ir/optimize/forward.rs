//! Store-to-load forwarding.
//!
//! `x <- s` directly followed by `d = x` reads back the value just written.
//! The pair becomes `f1, f2 = fork s; x <- f1; d = f2`, so `d` no longer
//! depends on the location and the store can die on its own if `x` is not
//! read again.

use tracing::trace;

use super::PassContext;
use crate::error::Result;
use crate::ir::types::*;

pub fn forward_stores(func: &mut IrFunction, ctx: &mut PassContext) -> Result<()> {
    let mut pos = 0;
    while pos + 1 < func.len() {
        let Some((location, src, dest)) = store_then_load(func, pos) else {
            pos += 1;
            continue;
        };
        trace!(pos, location = %func.operand_name(location), "forwarded store");

        let (f1, f2) = (func.new_temp(), func.new_temp());
        let types = func.operand(src).types;
        let constant = func.operand(src).constant.clone();
        for fork in [f1, f2] {
            let operand = func.operand_mut(fork);
            operand.types = types;
            operand.constant = constant.clone();
        }
        func.replace(
            pos,
            Inst::Fork {
                src,
                dest1: f1,
                dest2: f2,
            },
        );
        func.insert(
            pos + 1,
            Inst::Store {
                dest: location,
                src: f1,
            },
        )?;
        func.replace(pos + 2, Inst::Assign { dest, src: f2 });
        // The value no longer comes from the variable
        func.operand_mut(dest).var_alias = None;

        ctx.stats.forwarded += 1;
        pos += 3;
    }
    Ok(())
}

/// `(location, stored value, loading temp)` if `pos` starts a store/load pair
fn store_then_load(func: &IrFunction, pos: usize) -> Option<(OperandId, OperandId, OperandId)> {
    let Inst::Store { dest: location, src } = func.inst(pos) else {
        return None;
    };
    let Inst::Assign { dest, src: loaded } = func.inst(pos + 1) else {
        return None;
    };
    if loaded != location || !func.is_temp(*dest) {
        return None;
    }
    match func.kind(*location) {
        OperandKind::Var(_) | OperandKind::Glob(_) | OperandKind::Deref(_) => {
            Some((*location, *src, *dest))
        }
        _ => None,
    }
}
