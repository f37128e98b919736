//! x64 Native Code Generation Backend
//!
//! Direct x64 machine code generation for register-allocated IR.
//!
//! ## Architecture
//!
//! ```text
//! IrFunction (allocated) → X64Codegen → Assembler → NativeFunction
//! ```
//!
//! ## Modules
//!
//! - `registers`: x64 register definitions and the allocatable pool
//! - `encoding`: x64 instruction encoding (REX, ModR/M, SIB)
//! - `assembler`: listing and label fixups over the encoder
//! - `helpers`: runtime helper routines and their addresses
//! - `codegen`: IR to x64 translation

pub mod assembler;
pub mod codegen;
pub mod encoding;
pub mod helpers;
pub mod registers;

pub use codegen::{generate, FrameLayout, NativeFunction, Relocation, X64Codegen};
pub use helpers::{HelperTable, RuntimeHelper};
pub use registers::{Reg64, ALLOCATABLE_REGS};
