//! # stackjit
//!
//! Optimizing back end for a stack-bytecode JIT: lowers one bytecode
//! function into a register-style IR, optimizes it with type and constant
//! hints, allocates registers by linear scan, and emits x86-64 code.
//!
//! ## Phases
//!
//! | Phase    | Module          | Output                         |
//! |----------|-----------------|--------------------------------|
//! | Lower    | `ir::lower`     | IR with runtime assertions     |
//! | Optimize | `ir::optimize`  | Smaller IR, liveness intervals |
//! | Allocate | `ir::regalloc`  | Register or slot per operand   |
//! | Emit     | `x64::codegen`  | Machine code and relocations   |

pub mod bytecode;
pub mod config;
pub mod error;
pub mod ir;
pub mod value;
pub mod x64;

use tracing::debug;

pub use bytecode::Function;
pub use config::CompileOptions;
pub use error::{CompileError, Result};
pub use ir::IrFunction;
pub use x64::{HelperTable, NativeFunction};

/// Lower, optimize and register-allocate one bytecode function
pub fn compile_ir(function: &Function, options: &CompileOptions) -> Result<IrFunction> {
    options.validate()?;

    // Phase 1: Lower
    let mut func = ir::lower_function(function)?;

    // Phase 2: Optimize (liveness is always recomputed at the end)
    let stats = ir::optimize_ir(&mut func, options)?;

    // Phase 3: Allocate
    let alloc = ir::allocate_registers(&mut func, options.register_pool())?;

    debug!(
        before = stats.instructions_before,
        after = stats.instructions_after,
        registers = alloc.registers.len(),
        spilled_vars = alloc.spilled_vars,
        spilled_temps = alloc.spilled_temps,
        "compiled function"
    );
    Ok(func)
}

/// Compile one bytecode function to x86-64 code
pub fn compile_native(
    function: &Function,
    options: &CompileOptions,
    helpers: &HelperTable,
) -> Result<NativeFunction> {
    let func = compile_ir(function, options)?;

    // Phase 4: Emit
    x64::generate(&func, helpers)
}
