//! Compilation options.
//!
//! Options are plain data passed by reference into every phase; nothing is
//! kept in global state between compilations.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};
use crate::x64::registers::{Reg64, ALLOCATABLE_REGS};

/// Options for one compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Raise statically provable illegal casts and arithmetic as errors
    /// instead of leaving them to runtime assertions.
    pub report_compile_errors: bool,
    /// Run the optimization passes. Liveness and allocation always run.
    pub optimize: bool,
    /// Rounds of the optimization pass sequence.
    pub fixpoint_iterations: usize,
    /// Largest instruction-index distance relaxed to a short jump.
    pub short_jump_max: usize,
    /// Size of the allocatable register pool.
    pub registers: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            report_compile_errors: false,
            optimize: true,
            fixpoint_iterations: 2,
            short_jump_max: 1,
            registers: ALLOCATABLE_REGS.len(),
        }
    }
}

impl CompileOptions {
    /// Load options from a JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let options: CompileOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registers > ALLOCATABLE_REGS.len() {
            return Err(CompileError::InvalidOption {
                message: format!(
                    "registers must be at most {}, got {}",
                    ALLOCATABLE_REGS.len(),
                    self.registers
                ),
            });
        }
        Ok(())
    }

    /// The registers the allocator may hand out
    pub fn register_pool(&self) -> &'static [Reg64] {
        &ALLOCATABLE_REGS[..self.registers.min(ALLOCATABLE_REGS.len())]
    }
}
