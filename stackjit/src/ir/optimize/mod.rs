//! IR Optimization Passes
//!
//! Passes performed on a lowered function:
//! - Loading of variables that are read before they are written
//! - Type and constant propagation
//! - Constant folding
//! - Type specialization of generic operations
//! - Store-to-load forwarding
//! - Dead store and dead temp elimination
//! - Short jump relaxation
//!
//! Every pass takes the function and a [`PassContext`]. Passes never delete
//! an instruction directly: they either `remove` it (dropped when the pass
//! finishes) or mark its destination obsolete, after which the sweep removes
//! the definition along with whatever only existed to feed it.

mod dead;
mod fold;
mod forward;
mod jumps;
mod params;
mod propagate;
mod specialize;

use std::collections::BTreeSet;

use tracing::debug;

use super::liveness::compute_liveness;
use super::types::*;
use crate::config::CompileOptions;
use crate::error::{CompileError, Result};

pub use dead::{eliminate_dead_stores, eliminate_dead_temps, sweep_obsolete};
pub use fold::fold_constants;
pub use forward::forward_stores;
pub use jumps::relax_short_jumps;
pub use params::load_read_first_vars;
pub use propagate::propagate_types;
pub use specialize::specialize_types;

/// Signature shared by all passes
pub type PassFn = fn(&mut IrFunction, &mut PassContext) -> Result<()>;

/// Passes of one optimization round, in order
const ROUND: &[(&str, PassFn)] = &[
    ("propagate-types", propagate_types),
    ("fold-constants", fold_constants),
    ("specialize-types", specialize_types),
    ("forward-stores", forward_stores),
    ("dead-stores", eliminate_dead_stores),
    ("dead-temps", eliminate_dead_temps),
];

/// State shared by the passes of one compilation
pub struct PassContext<'a> {
    pub options: &'a CompileOptions,
    obsolete: BTreeSet<OperandId>,
    pub stats: OptStats,
}

impl<'a> PassContext<'a> {
    pub fn new(options: &'a CompileOptions) -> Self {
        Self {
            options,
            obsolete: BTreeSet::new(),
            stats: OptStats::default(),
        }
    }

    /// Mark a value as no longer needed by anything
    pub fn mark_obsolete(&mut self, id: OperandId) {
        self.obsolete.insert(id);
    }

    pub fn is_obsolete(&self, id: OperandId) -> bool {
        self.obsolete.contains(&id)
    }

    pub fn has_obsolete(&self) -> bool {
        !self.obsolete.is_empty()
    }

    fn clear_obsolete(&mut self) {
        self.obsolete.clear();
    }

    /// A statically detected user error. Fatal only when compile-time error
    /// reporting is on; otherwise the caller leaves the operation for the
    /// runtime to reject.
    pub fn report(&self, err: CompileError) -> Result<()> {
        if self.options.report_compile_errors {
            Err(err)
        } else {
            debug!(error = %err, "left to runtime");
            Ok(())
        }
    }
}

/// Counters collected while optimizing
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OptStats {
    pub instructions_before: usize,
    pub instructions_after: usize,
    pub folded: usize,
    pub specialized: usize,
    pub forwarded: usize,
    pub dead_stores: usize,
    pub removed: usize,
    pub short_jumps: usize,
}

/// Run the optimization pipeline, then compute final live intervals.
///
/// Variables read before any write are always given a `ForceLoad`, since the
/// allocator may keep them in registers; everything else is skipped when
/// optimization is off.
pub fn optimize_ir(func: &mut IrFunction, options: &CompileOptions) -> Result<OptStats> {
    let mut ctx = PassContext::new(options);
    ctx.stats.instructions_before = func.len();

    run_pass(func, &mut ctx, "load-vars", load_read_first_vars)?;
    if options.optimize {
        for round in 0..options.fixpoint_iterations {
            debug!(function = %func.name, round, "optimization round");
            for (name, pass) in ROUND {
                run_pass(func, &mut ctx, name, *pass)?;
            }
        }
        run_pass(func, &mut ctx, "short-jumps", relax_short_jumps)?;
    }
    compute_liveness(func)?;

    ctx.stats.instructions_after = func.len();
    debug!(
        function = %func.name,
        before = ctx.stats.instructions_before,
        after = ctx.stats.instructions_after,
        "optimized"
    );
    Ok(ctx.stats)
}

/// Run one pass, sweep what it made obsolete and drop deleted positions
pub fn run_pass(
    func: &mut IrFunction,
    ctx: &mut PassContext,
    name: &str,
    pass: PassFn,
) -> Result<()> {
    let before = func.len();
    pass(func, ctx)?;
    sweep_obsolete(func, ctx)?;
    let removed = func.compact();
    ctx.stats.removed += removed;
    debug!(pass = name, before, after = func.len(), "ran pass");
    Ok(())
}
