//! Intermediate Representation (IR) for stack bytecode
//!
//! A register-style representation of one bytecode function, built for
//! analysis and rewriting. Stack slots become single-definition temps;
//! locals, globals and closure cells become interned operands.
//!
//! ## Design Principles
//!
//! - **Temp-based**: Every computed value gets a fresh temp
//! - **Explicit control flow**: Labels and jumps, as in the bytecode
//! - **Hint-carrying**: Operands accumulate type and constant hints
//! - **Allocation-ready**: Liveness and registers live on the operands
//!
//! ## Pipeline
//!
//! ```text
//! Function → lower → [Optimizations] → liveness → regalloc → Codegen
//! ```

pub mod liveness;
pub mod lower;
pub mod optimize;
pub mod regalloc;
pub mod types;

pub use liveness::compute_liveness;
pub use lower::lower_function;
pub use optimize::{optimize_ir, OptStats, PassContext};
pub use regalloc::{allocate_registers, AllocStats};
pub use types::*;
