//! x64 Register Definitions
//!
//! The 16 general-purpose 64-bit registers and the roles the backend gives
//! them: an allocatable pool handed to the linear-scan allocator, a scratch
//! set used inside a single instruction's lowering, and the System V argument
//! registers used for runtime helper calls.

use std::fmt;

/// x64 64-bit general purpose register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Reg64 {
    RAX = 0,
    RCX = 1,
    RDX = 2,
    RBX = 3,
    RSP = 4,
    RBP = 5,
    RSI = 6,
    RDI = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg64 {
    /// Get the 3-bit encoding for ModR/M and SIB bytes
    #[inline]
    pub fn encoding(self) -> u8 {
        (self as u8) & 0x07
    }

    /// Check if this register requires REX.B or REX.R bit
    #[inline]
    pub fn needs_rex_ext(self) -> bool {
        (self as u8) >= 8
    }

    /// Check if this register is callee-saved (System V ABI)
    pub fn is_callee_saved(self) -> bool {
        matches!(
            self,
            Reg64::RBX | Reg64::RBP | Reg64::R12 | Reg64::R13 | Reg64::R14 | Reg64::R15
        )
    }

    /// Check if this register is caller-saved (System V ABI)
    pub fn is_caller_saved(self) -> bool {
        !self.is_callee_saved() && self != Reg64::RSP
    }
}

impl fmt::Display for Reg64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg64::RAX => "rax",
            Reg64::RCX => "rcx",
            Reg64::RDX => "rdx",
            Reg64::RBX => "rbx",
            Reg64::RSP => "rsp",
            Reg64::RBP => "rbp",
            Reg64::RSI => "rsi",
            Reg64::RDI => "rdi",
            Reg64::R8 => "r8",
            Reg64::R9 => "r9",
            Reg64::R10 => "r10",
            Reg64::R11 => "r11",
            Reg64::R12 => "r12",
            Reg64::R13 => "r13",
            Reg64::R14 => "r14",
            Reg64::R15 => "r15",
        };
        write!(f, "{}", name)
    }
}

/// Registers handed out by the allocator, in preference order.
///
/// Callee-saved registers come first so short programs rarely need to save
/// anything around helper calls.
pub const ALLOCATABLE_REGS: [Reg64; 9] = [
    Reg64::R12,
    Reg64::R13,
    Reg64::R14,
    Reg64::R15,
    Reg64::R8,
    Reg64::R9,
    Reg64::R10,
    Reg64::R11,
    Reg64::RBX,
];

/// Callee-saved registers from the pool, pushed in the prologue
pub const SAVED_POOL_REGS: [Reg64; 5] = [
    Reg64::RBX,
    Reg64::R12,
    Reg64::R13,
    Reg64::R14,
    Reg64::R15,
];

/// Argument registers for runtime helper calls (System V order)
pub const HELPER_ARG_REGS: [Reg64; 4] = [Reg64::RDI, Reg64::RSI, Reg64::RDX, Reg64::RCX];

/// Return register for helpers and compiled functions
pub const RET_REG: Reg64 = Reg64::RAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_encoding() {
        assert_eq!(Reg64::RAX.encoding(), 0);
        assert_eq!(Reg64::RCX.encoding(), 1);
        assert_eq!(Reg64::R8.encoding(), 0);
        assert_eq!(Reg64::R15.encoding(), 7);
    }

    #[test]
    fn test_rex_extension() {
        assert!(!Reg64::RAX.needs_rex_ext());
        assert!(!Reg64::RDI.needs_rex_ext());
        assert!(Reg64::R8.needs_rex_ext());
        assert!(Reg64::R15.needs_rex_ext());
    }

    #[test]
    fn test_pool_avoids_call_registers() {
        for reg in ALLOCATABLE_REGS {
            assert!(!HELPER_ARG_REGS.contains(&reg), "{} passes arguments", reg);
            assert_ne!(reg, RET_REG);
            assert_ne!(reg, Reg64::RSP);
            assert_ne!(reg, Reg64::RBP);
        }
    }

    #[test]
    fn test_saved_pool_regs_are_callee_saved() {
        for reg in SAVED_POOL_REGS {
            assert!(reg.is_callee_saved());
            assert!(ALLOCATABLE_REGS.contains(&reg));
        }
        let caller_saved: Vec<_> = ALLOCATABLE_REGS
            .iter()
            .filter(|r| r.is_caller_saved())
            .collect();
        assert_eq!(caller_saved.len(), 4);
    }
}
