//! Dead store and dead temp elimination, and the obsolete-value sweep.

use std::collections::HashMap;

use tracing::trace;

use super::PassContext;
use crate::bytecode::Constant;
use crate::error::Result;
use crate::ir::liveness::{compute_liveness, compute_read_liveness};
use crate::ir::types::*;

/// Remove stores to variables that are not read afterwards.
///
/// Repeats until no dead store is left: a removed store takes the load that
/// fed it along, which can leave earlier stores unread.
pub fn eliminate_dead_stores(func: &mut IrFunction, ctx: &mut PassContext) -> Result<()> {
    loop {
        compute_read_liveness(func)?;
        let mut found = false;
        for pos in 0..func.len() {
            if func.is_removed(pos) {
                continue;
            }
            if let Inst::Store { dest, src } = func.inst(pos) {
                let (dest, src) = (*dest, *src);
                if func.is_var(dest) && func.operand(dest).live_end <= pos {
                    trace!(pos, var = %func.operand_name(dest), "dead store");
                    func.remove(pos);
                    ctx.mark_obsolete(src);
                    ctx.stats.dead_stores += 1;
                    found = true;
                }
            }
        }
        if !found {
            return Ok(());
        }
        sweep_obsolete(func, ctx)?;
        ctx.stats.removed += func.compact();
    }
}

/// Remove temps that are never read and forward temp-to-temp copies.
///
/// Repeats until no dead temp is left, since removing a definition can leave
/// its own sources unread.
pub fn eliminate_dead_temps(func: &mut IrFunction, ctx: &mut PassContext) -> Result<()> {
    loop {
        compute_liveness(func)?;
        for &temp in func.temps() {
            if func.operand(temp).is_dead() {
                ctx.mark_obsolete(temp);
            }
        }
        forward_copies(func, ctx);
        if !ctx.has_obsolete() {
            return Ok(());
        }
        sweep_obsolete(func, ctx)?;
        ctx.stats.removed += func.compact();
    }
}

/// Replace reads of `d` by `s` after `d = s` between temps; `d` goes away
fn forward_copies(func: &mut IrFunction, ctx: &mut PassContext) {
    let mut aliases: HashMap<OperandId, OperandId> = HashMap::new();
    for pos in 0..func.len() {
        if func.is_removed(pos) {
            continue;
        }
        if !aliases.is_empty() {
            for used in func.inst_mut(pos).uses_mut() {
                if let Some(&src) = aliases.get(&*used) {
                    *used = src;
                }
            }
        }
        if let Inst::Assign { dest, src } = func.inst(pos) {
            let (dest, src) = (*dest, *src);
            if func.is_temp(dest) && func.is_temp(src) && !ctx.is_obsolete(dest) {
                aliases.insert(dest, src);
                ctx.mark_obsolete(dest);
            }
        }
    }
}

/// Delete definitions of obsolete values.
///
/// Runs backwards so that an operation found dead can retire its operands,
/// and the assertions on them, before their definitions are reached.
/// Plain copies do not retire their source: after copy forwarding the source
/// may have taken over the copy's readers.
pub fn sweep_obsolete(func: &mut IrFunction, ctx: &mut PassContext) -> Result<()> {
    for pos in (0..func.len()).rev() {
        if func.is_removed(pos) {
            continue;
        }
        match func.inst(pos).clone() {
            Inst::Assign { dest, .. } if ctx.is_obsolete(dest) => func.remove(pos),
            Inst::Binary { dest, lhs, rhs, .. } if ctx.is_obsolete(dest) => {
                func.remove(pos);
                ctx.mark_obsolete(lhs);
                ctx.mark_obsolete(rhs);
            }
            Inst::Unary { dest, src, .. } if ctx.is_obsolete(dest) => {
                func.remove(pos);
                ctx.mark_obsolete(src);
            }
            Inst::Fork { src, dest1, dest2 } => {
                match (ctx.is_obsolete(dest1), ctx.is_obsolete(dest2)) {
                    (true, true) => {
                        func.remove(pos);
                        ctx.mark_obsolete(src);
                    }
                    (true, false) => func.replace(pos, Inst::Assign { dest: dest2, src }),
                    (false, true) => func.replace(pos, Inst::Assign { dest: dest1, src }),
                    (false, false) => {}
                }
            }
            Inst::CallAssert { kind, arg } => {
                if ctx.is_obsolete(arg) || assertion_holds(func, kind, arg) {
                    trace!(pos, %kind, arg = %func.operand_name(arg), "assertion removed");
                    func.remove(pos);
                }
            }
            _ => {}
        }
    }
    ctx.clear_obsolete();
    Ok(())
}

/// Whether `kind` is already proven for `arg`
fn assertion_holds(func: &IrFunction, kind: AssertKind, arg: OperandId) -> bool {
    let operand = func.operand(arg);
    match kind {
        AssertKind::Int => operand.is_int(),
        AssertKind::Bool => operand.is_bool(),
        AssertKind::NotZero => matches!(operand.constant, Some(Constant::Integer(n)) if n != 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;

    fn context(options: &CompileOptions) -> PassContext<'_> {
        PassContext::new(options)
    }

    #[test]
    fn test_store_without_later_read_is_removed() {
        let mut func = IrFunction::new("f");
        let x = func.var(0);
        let (a, b, c) = (func.new_temp(), func.new_temp(), func.new_temp());
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: a, src: one }); // 0
        func.push(Inst::Store { dest: x, src: a }); // 1
        func.push(Inst::Assign { dest: b, src: x }); // 2
        func.push(Inst::Assign { dest: c, src: one }); // 3
        func.push(Inst::Store { dest: x, src: c }); // 4
        func.push(Inst::Return { value: b }); // 5

        let options = CompileOptions::default();
        let mut ctx = context(&options);
        eliminate_dead_stores(&mut func, &mut ctx).unwrap();
        assert_eq!(ctx.stats.dead_stores, 1);
        let insts = func.instructions();
        assert_eq!(insts.len(), 4, "{}", func);
        assert_eq!(insts[1], &Inst::Store { dest: x, src: a });
        assert_eq!(insts[3], &Inst::Return { value: b });
    }

    #[test]
    fn test_dead_store_chain_is_removed() {
        // x = 1; y = x; z = y; nothing is read
        let mut func = IrFunction::new("f");
        let (x, y, z) = (func.var(0), func.var(1), func.var(2));
        let (a, b, c) = (func.new_temp(), func.new_temp(), func.new_temp());
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: a, src: one });
        func.push(Inst::Store { dest: x, src: a });
        func.push(Inst::Assign { dest: b, src: x });
        func.push(Inst::Store { dest: y, src: b });
        func.push(Inst::Assign { dest: c, src: y });
        func.push(Inst::Store { dest: z, src: c });

        let options = CompileOptions::default();
        let mut ctx = context(&options);
        eliminate_dead_stores(&mut func, &mut ctx).unwrap();
        assert_eq!(ctx.stats.dead_stores, 3);
        assert!(func.is_empty(), "{}", func);
    }

    #[test]
    fn test_global_stores_are_kept() {
        let mut func = IrFunction::new("f");
        let g = func.location(OperandKind::Glob(0)).unwrap();
        let a = func.new_temp();
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: a, src: one });
        func.push(Inst::Store { dest: g, src: a });
        let options = CompileOptions::default();
        let mut ctx = context(&options);
        eliminate_dead_stores(&mut func, &mut ctx).unwrap();
        assert!(!func.is_removed(1));
    }

    #[test]
    fn test_unused_operation_retires_its_operands() {
        // t0 = 6; t1 = x; assert_int t1; t2 = sub t0, t1 (unused)
        let mut func = IrFunction::new("f");
        func.parameter_count = 1;
        let x = func.var(0);
        let (a, b, c) = (func.new_temp(), func.new_temp(), func.new_temp());
        let six = func.constant(Constant::Integer(6));
        func.push(Inst::Assign { dest: a, src: six });
        func.push(Inst::Assign { dest: b, src: x });
        func.push(Inst::CallAssert {
            kind: AssertKind::Int,
            arg: b,
        });
        func.push(Inst::Binary {
            op: BinOp::Sub,
            dest: c,
            lhs: a,
            rhs: b,
        });
        let options = CompileOptions::default();
        let mut ctx = context(&options);
        eliminate_dead_temps(&mut func, &mut ctx).unwrap();
        assert!(func.is_empty(), "{}", func);
    }

    #[test]
    fn test_fork_with_one_dead_side_becomes_copy() {
        let mut func = IrFunction::new("f");
        let (s, d1, d2) = (func.new_temp(), func.new_temp(), func.new_temp());
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: s, src: one });
        func.push(Inst::Fork {
            src: s,
            dest1: d1,
            dest2: d2,
        });
        func.push(Inst::Return { value: d2 });
        let options = CompileOptions::default();
        let mut ctx = context(&options);
        ctx.mark_obsolete(d1);
        sweep_obsolete(&mut func, &mut ctx).unwrap();
        assert_eq!(func.inst(1), &Inst::Assign { dest: d2, src: s });
        assert!(!ctx.has_obsolete());
    }

    #[test]
    fn test_copies_are_forwarded() {
        let mut func = IrFunction::new("f");
        let (a, b, c) = (func.new_temp(), func.new_temp(), func.new_temp());
        let one = func.constant(Constant::Integer(1));
        func.push(Inst::Assign { dest: a, src: one });
        func.push(Inst::Assign { dest: b, src: a });
        func.push(Inst::Assign { dest: c, src: b });
        func.push(Inst::CallAssert {
            kind: AssertKind::Int,
            arg: c,
        });
        func.push(Inst::Return { value: c });
        let options = CompileOptions::default();
        let mut ctx = context(&options);
        eliminate_dead_temps(&mut func, &mut ctx).unwrap();
        let insts = func.instructions();
        assert_eq!(insts.len(), 3, "{}", func);
        assert_eq!(insts[1], &Inst::CallAssert {
            kind: AssertKind::Int,
            arg: a,
        });
        assert_eq!(insts[2], &Inst::Return { value: a });
    }

    #[test]
    fn test_proven_assertions_are_dropped() {
        let mut func = IrFunction::new("f");
        let (a, b) = (func.new_temp(), func.new_temp());
        func.add_types(a, TypeHints::INT);
        func.operand_mut(a).constant = Some(Constant::Integer(0));
        func.add_types(b, TypeHints::INT.union(TypeHints::BOOL));
        for (kind, arg) in [
            (AssertKind::Int, a),
            (AssertKind::NotZero, a),
            (AssertKind::Int, b),
            (AssertKind::Bool, b),
        ] {
            func.push(Inst::CallAssert { kind, arg });
        }
        let options = CompileOptions::default();
        let mut ctx = context(&options);
        sweep_obsolete(&mut func, &mut ctx).unwrap();
        assert!(func.is_removed(0));
        // Zero may fail the check
        assert!(!func.is_removed(1));
        assert!(!func.is_removed(2));
        assert!(!func.is_removed(3));
    }
}
