//! Entry loads for variables.
//!
//! Variables may live in registers, but on entry their values (parameters,
//! or whatever the runtime left in the locals array) are only in memory. A
//! variable gets a `ForceLoad` at the top of the function unless it is
//! written before its first read in the straight-line code that opens the
//! function, where no jump can bypass the write.

use std::collections::BTreeSet;

use tracing::trace;

use super::PassContext;
use crate::error::Result;
use crate::ir::types::*;

pub fn load_read_first_vars(func: &mut IrFunction, _ctx: &mut PassContext) -> Result<()> {
    let mut written = BTreeSet::new();
    let mut needs_load = BTreeSet::new();
    let mut loaded = BTreeSet::new();
    let mut straight = true;

    for (_, inst) in func.iter() {
        match inst {
            Inst::ForceLoad { var } => {
                loaded.insert(*var);
            }
            Inst::Store { dest, .. } if func.is_var(*dest) && straight => {
                written.insert(*dest);
            }
            Inst::Assign { src, .. } if func.is_var(*src) => {
                if !written.contains(src) {
                    needs_load.insert(*src);
                }
            }
            Inst::Label { .. } | Inst::Jump { .. } | Inst::ShortJump { .. } | Inst::CondJump { .. } => {
                straight = false;
            }
            _ => {}
        }
    }

    let pending: Vec<OperandId> = needs_load.difference(&loaded).copied().collect();
    for &var in pending.iter().rev() {
        trace!(var = %func.operand_name(var), "entry load");
        func.insert(0, Inst::ForceLoad { var })?;
    }
    Ok(())
}
