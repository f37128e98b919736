//! Liveness Analysis
//!
//! Two forward scans over the instruction list:
//!
//! - **Temps** are defined once and read once, inside the statement that
//!   produced them, so their interval is simply definition to last read.
//! - **Vars** live across statements and loops. A backward jump widens the
//!   interval of every variable read between the jump target and the jump,
//!   so a variable that is read at the top of a loop stays live through the
//!   whole body.
//!
//! Final intervals also reach the last write of each variable, so the
//! register stays reserved for any store left after the last read. Dead
//! store detection wants the read-only intervals instead.
//!
//! Intervals are recomputed from scratch each time: passes that delete
//! instructions invalidate them.

use tracing::trace;

use super::types::*;
use crate::error::Result;

/// Recompute live intervals of all operands
pub fn compute_liveness(func: &mut IrFunction) -> Result<()> {
    compute_read_liveness(func)?;
    cover_writes(func);
    Ok(())
}

/// Recompute intervals that end at the last read. A store to a variable
/// after its interval ends is never read.
pub fn compute_read_liveness(func: &mut IrFunction) -> Result<()> {
    func.reset_liveness();
    temp_liveness(func);
    var_liveness(func)
}

fn define(func: &mut IrFunction, id: OperandId, pos: usize) {
    let operand = func.operand_mut(id);
    if operand.live_start == UNSET || pos < operand.live_start {
        operand.live_start = pos;
    }
}

fn read(func: &mut IrFunction, id: OperandId, pos: usize) {
    let operand = func.operand_mut(id);
    if operand.live_end == UNSET || pos > operand.live_end {
        operand.live_end = pos;
    }
}

fn temp_liveness(func: &mut IrFunction) {
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        let inst = func.inst(pos);
        let defs = inst.defs();
        let uses = inst.uses();
        for id in uses {
            if func.is_temp(id) {
                read(func, id, pos);
            }
        }
        for id in defs {
            if func.is_temp(id) {
                define(func, id, pos);
            }
        }
    }
}

fn var_liveness(func: &mut IrFunction) -> Result<()> {
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        match func.inst(pos).clone() {
            Inst::Assign { src, .. } if func.is_var(src) => {
                define(func, src, pos);
                read(func, src, pos);
            }
            Inst::Store { dest, .. } if func.is_var(dest) => write_var(func, dest, pos),
            Inst::ForceLoad { var } => write_var(func, var, pos),
            Inst::Jump { label } | Inst::ShortJump { label } | Inst::CondJump { label, .. } => {
                let target = func.label_position(label)?;
                if target < pos {
                    extend_loop_reads(func, target, pos);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// A write opens the interval; it only closes it if nothing was read yet
fn write_var(func: &mut IrFunction, var: OperandId, pos: usize) {
    define(func, var, pos);
    let operand = func.operand_mut(var);
    if operand.live_end == UNSET {
        operand.live_end = pos;
    }
}

fn cover_writes(func: &mut IrFunction) {
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        let var = match func.inst(pos) {
            Inst::Store { dest, .. } if func.is_var(*dest) => *dest,
            Inst::ForceLoad { var } => *var,
            _ => continue,
        };
        let operand = func.operand_mut(var);
        if pos > operand.live_end {
            trace!(pos, "interval extended to trailing write");
            operand.live_end = pos;
        }
    }
}

/// Keep every variable read in `target..=jump` alive until the back edge
fn extend_loop_reads(func: &mut IrFunction, target: usize, jump: usize) {
    for pos in target..=jump {
        if func.is_removed(pos) {
            continue;
        }
        if let Inst::Assign { src, .. } = func.inst(pos) {
            let src = *src;
            if func.is_var(src) && func.operand(src).live_end < jump {
                trace!(var = %func.operand_name(src), jump, "extended across back edge");
                func.operand_mut(src).live_end = jump;
            }
        }
    }
}
