//! Short jump relaxation.

use super::PassContext;
use crate::error::Result;
use crate::ir::types::*;

/// Mark jumps whose target is within `short_jump_max` instructions for the
/// short native encoding
pub fn relax_short_jumps(func: &mut IrFunction, ctx: &mut PassContext) -> Result<()> {
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        if let Inst::Jump { label } = *func.inst(pos) {
            let target = func.label_position(label)?;
            if pos.abs_diff(target) <= ctx.options.short_jump_max {
                func.replace(pos, Inst::ShortJump { label });
                ctx.stats.short_jumps += 1;
            }
        }
    }
    Ok(())
}
