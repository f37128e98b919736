//! Listing Assembler
//!
//! Thin layer over [`CodeBuffer`] that keeps an Intel-syntax listing of
//! everything emitted and resolves jumps to IR labels once all label
//! offsets are known.

use std::collections::HashMap;

use super::encoding::{CodeBuffer, Cond};
use super::registers::Reg64;
use crate::error::{CompileError, Result};
use crate::ir::LabelId;

/// Pending jump displacement
#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Offset of the displacement field
    at: usize,
    label: LabelId,
    /// Displacement width in bits
    width: u8,
}

#[derive(Debug, Default)]
pub struct Assembler {
    code: CodeBuffer,
    listing: Vec<String>,
    labels: HashMap<LabelId, usize>,
    fixups: Vec<Fixup>,
}

fn mem(base: Reg64, disp: i32) -> String {
    match disp {
        0 => format!("[{}]", base),
        d if d < 0 => format!("[{} - {}]", base, -(d as i64)),
        d => format!("[{} + {}]", base, d),
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.code.offset()
    }

    fn note(&mut self, offset: usize, text: String) {
        self.listing.push(format!("{:6x}:  {}", offset, text));
    }

    /// Add a comment line to the listing
    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.listing.push(format!("        ; {}", text.as_ref()));
    }

    /// Run `emit` and record `text` at the offset it started
    fn op(&mut self, text: String, emit: impl FnOnce(&mut CodeBuffer)) {
        let offset = self.code.offset();
        emit(&mut self.code);
        self.note(offset, text);
    }

    // ==================== Data Movement ====================

    pub fn mov(&mut self, dst: Reg64, src: Reg64) {
        if dst != src {
            self.op(format!("mov {}, {}", dst, src), |c| c.mov_r64_r64(dst, src));
        }
    }

    pub fn load(&mut self, dst: Reg64, base: Reg64, disp: i32) {
        self.op(format!("mov {}, {}", dst, mem(base, disp)), |c| {
            c.mov_r64_m64(dst, base, disp)
        });
    }

    pub fn store(&mut self, base: Reg64, disp: i32, src: Reg64) {
        self.op(format!("mov {}, {}", mem(base, disp), src), |c| {
            c.mov_m64_r64(base, disp, src)
        });
    }

    /// Load a 64-bit immediate, using the short form when it fits
    pub fn mov_imm(&mut self, dst: Reg64, imm: u64) {
        let signed = imm as i64;
        match i32::try_from(signed) {
            Ok(small) => self.op(format!("mov {}, {:#x}", dst, imm), |c| {
                c.mov_r64_imm32(dst, small)
            }),
            Err(_) => {
                self.mov_imm64(dst, imm, None);
            }
        }
    }

    /// Full-width immediate load; returns the immediate's offset for
    /// relocation
    pub fn mov_imm64(&mut self, dst: Reg64, imm: u64, symbol: Option<&str>) -> usize {
        let offset = self.code.offset();
        let at = self.code.mov_r64_imm64(dst, imm);
        let text = match symbol {
            Some(symbol) => format!("movabs {}, {:#x} <{}>", dst, imm, symbol),
            None => format!("movabs {}, {:#x}", dst, imm),
        };
        self.note(offset, text);
        at
    }

    pub fn cmov(&mut self, cond: Cond, dst: Reg64, src: Reg64) {
        self.op(format!("cmov{} {}, {}", cond.mnemonic(), dst, src), |c| {
            c.cmov_r64_r64(cond, dst, src)
        });
    }

    // ==================== Arithmetic ====================

    pub fn add(&mut self, dst: Reg64, src: Reg64) {
        self.op(format!("add {}, {}", dst, src), |c| c.add_r64_r64(dst, src));
    }

    pub fn add_imm(&mut self, dst: Reg64, imm: i32) {
        self.op(format!("add {}, {}", dst, imm), |c| c.add_r64_imm32(dst, imm));
    }

    pub fn sub(&mut self, dst: Reg64, src: Reg64) {
        self.op(format!("sub {}, {}", dst, src), |c| c.sub_r64_r64(dst, src));
    }

    pub fn sub_imm(&mut self, dst: Reg64, imm: i32) {
        self.op(format!("sub {}, {}", dst, imm), |c| c.sub_r64_imm32(dst, imm));
    }

    pub fn imul(&mut self, dst: Reg64, src: Reg64) {
        self.op(format!("imul {}, {}", dst, src), |c| c.imul_r64_r64(dst, src));
    }

    pub fn cqo(&mut self) {
        self.op("cqo".to_string(), |c| c.cqo());
    }

    pub fn idiv(&mut self, divisor: Reg64) {
        self.op(format!("idiv {}", divisor), |c| c.idiv_r64(divisor));
    }

    pub fn neg(&mut self, dst: Reg64) {
        self.op(format!("neg {}", dst), |c| c.neg_r64(dst));
    }

    pub fn sar(&mut self, dst: Reg64, amount: u8) {
        self.op(format!("sar {}, {}", dst, amount), |c| c.sar_r64_imm8(dst, amount));
    }

    pub fn shl(&mut self, dst: Reg64, amount: u8) {
        self.op(format!("shl {}, {}", dst, amount), |c| c.shl_r64_imm8(dst, amount));
    }

    pub fn and(&mut self, dst: Reg64, src: Reg64) {
        self.op(format!("and {}, {}", dst, src), |c| c.and_r64_r64(dst, src));
    }

    pub fn or(&mut self, dst: Reg64, src: Reg64) {
        self.op(format!("or {}, {}", dst, src), |c| c.or_r64_r64(dst, src));
    }

    pub fn xor_imm(&mut self, dst: Reg64, imm: i32) {
        self.op(format!("xor {}, {:#x}", dst, imm), |c| c.xor_r64_imm32(dst, imm));
    }

    pub fn cmp(&mut self, left: Reg64, right: Reg64) {
        self.op(format!("cmp {}, {}", left, right), |c| c.cmp_r64_r64(left, right));
    }

    pub fn cmp_imm(&mut self, left: Reg64, imm: i32) {
        self.op(format!("cmp {}, {:#x}", left, imm), |c| c.cmp_r64_imm32(left, imm));
    }

    // ==================== Stack and Calls ====================

    pub fn push(&mut self, reg: Reg64) {
        self.op(format!("push {}", reg), |c| c.push_r64(reg));
    }

    pub fn pop(&mut self, reg: Reg64) {
        self.op(format!("pop {}", reg), |c| c.pop_r64(reg));
    }

    pub fn leave(&mut self) {
        self.op("leave".to_string(), |c| c.leave());
    }

    pub fn ret(&mut self) {
        self.op("ret".to_string(), |c| c.ret());
    }

    pub fn call(&mut self, target: Reg64) {
        self.op(format!("call {}", target), |c| c.call_r64(target));
    }

    // ==================== Labels and Jumps ====================

    pub fn bind(&mut self, label: LabelId) {
        let offset = self.code.offset();
        self.labels.insert(label, offset);
        self.listing.push(format!("{}:", label));
    }

    pub fn jmp(&mut self, label: LabelId) {
        let offset = self.code.offset();
        let at = self.code.jmp_rel32();
        self.fixups.push(Fixup { at, label, width: 32 });
        self.note(offset, format!("jmp {}", label));
    }

    pub fn jmp_short(&mut self, label: LabelId) {
        let offset = self.code.offset();
        let at = self.code.jmp_rel8();
        self.fixups.push(Fixup { at, label, width: 8 });
        self.note(offset, format!("jmp short {}", label));
    }

    pub fn je(&mut self, label: LabelId) {
        let offset = self.code.offset();
        let at = self.code.je_rel32();
        self.fixups.push(Fixup { at, label, width: 32 });
        self.note(offset, format!("je {}", label));
    }

    /// Patch every jump and return the code and listing
    pub fn finish(mut self) -> Result<(Vec<u8>, Vec<String>)> {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .get(&fixup.label)
                .copied()
                .ok_or(CompileError::UnknownLabel {
                    label: fixup.label.0,
                })?;
            let end = fixup.at + usize::from(fixup.width / 8);
            let rel = target as i64 - end as i64;
            let out_of_range = || CompileError::JumpOutOfRange {
                label: fixup.label.to_string(),
                width: fixup.width,
            };
            if fixup.width == 8 {
                let rel = i8::try_from(rel).map_err(|_| out_of_range())?;
                self.code.patch_i8(fixup.at, rel);
            } else {
                let rel = i32::try_from(rel).map_err(|_| out_of_range())?;
                self.code.patch_i32(fixup.at, rel);
            }
        }
        Ok((self.code.into_code(), self.listing))
    }
}
