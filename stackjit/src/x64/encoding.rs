//! x64 Instruction Encoding
//!
//! Byte-level encoding for the subset of x86-64 the backend emits.
//! No external assembler dependency.
//!
//! ## Instruction Format
//!
//! ```text
//! [REX] [Opcode] [ModR/M] [SIB] [Disp] [Imm]
//! ```
//!
//! Memory operands are always `[base + disp32]`, which keeps every frame and
//! array access the same length regardless of the displacement.

use super::registers::Reg64;

/// Machine code buffer for emitting instructions
#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Get current code offset
    #[inline]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Emit a single byte
    #[inline]
    pub fn emit(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Emit a 32-bit little-endian value
    #[inline]
    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit little-endian value
    #[inline]
    pub fn emit_u64(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a signed 32-bit little-endian value
    #[inline]
    pub fn emit_i32(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Patch a 32-bit value at the given offset
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        let bytes = value.to_le_bytes();
        self.code[offset..offset + 4].copy_from_slice(&bytes);
    }

    /// Patch an 8-bit displacement at the given offset
    pub fn patch_i8(&mut self, offset: usize, value: i8) {
        self.code[offset] = value as u8;
    }

    /// Get the generated code
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Take ownership of the generated code
    pub fn into_code(self) -> Vec<u8> {
        self.code
    }
}

/// REX prefix builder
#[derive(Debug, Clone, Copy, Default)]
pub struct Rex {
    w: bool, // 64-bit operand size
    r: bool, // ModR/M reg extension
    b: bool, // ModR/M r/m or SIB base extension
}

impl Rex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set W bit (64-bit operand size)
    pub fn w(mut self) -> Self {
        self.w = true;
        self
    }

    /// Set R bit when `reg` lives in r8-r15
    pub fn r_for(mut self, reg: Reg64) -> Self {
        self.r |= reg.needs_rex_ext();
        self
    }

    /// Set B bit when `reg` lives in r8-r15
    pub fn b_for(mut self, reg: Reg64) -> Self {
        self.b |= reg.needs_rex_ext();
        self
    }

    /// Check if REX prefix is needed
    pub fn is_needed(&self) -> bool {
        self.w || self.r || self.b
    }

    /// Encode to byte (0x40-0x4F)
    pub fn encode(&self) -> u8 {
        0x40 | ((self.w as u8) << 3) | ((self.r as u8) << 2) | (self.b as u8)
    }
}

/// ModR/M byte builder
#[derive(Debug, Clone, Copy)]
pub struct ModRM {
    mod_: u8, // 2 bits: addressing mode
    reg: u8,  // 3 bits: register or opcode extension
    rm: u8,   // 3 bits: register or memory operand
}

impl ModRM {
    /// Register-direct operand (mod=11)
    pub fn reg_reg(reg: u8, rm: u8) -> Self {
        Self {
            mod_: 0b11,
            reg: reg & 0x07,
            rm: rm & 0x07,
        }
    }

    /// `[rm + disp32]` operand (mod=10)
    pub fn mem_disp32(reg: u8, rm: u8) -> Self {
        Self {
            mod_: 0b10,
            reg: reg & 0x07,
            rm: rm & 0x07,
        }
    }

    /// Encode to byte
    pub fn encode(&self) -> u8 {
        (self.mod_ << 6) | (self.reg << 3) | self.rm
    }
}

/// Condition codes used by `cmovcc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Equal,
    Greater,
    GreaterEqual,
}

impl Cond {
    fn cmov_opcode(self) -> u8 {
        match self {
            Cond::Equal => 0x44,
            Cond::Greater => 0x4F,
            Cond::GreaterEqual => 0x4D,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Cond::Equal => "e",
            Cond::Greater => "g",
            Cond::GreaterEqual => "ge",
        }
    }
}

/// x64 instruction emitter
impl CodeBuffer {
    /// `REX.W op /r` with `reg` in the reg field and `rm` register-direct
    fn emit_rr(&mut self, opcode: &[u8], reg: Reg64, rm: Reg64) {
        self.emit(Rex::new().w().r_for(reg).b_for(rm).encode());
        for &byte in opcode {
            self.emit(byte);
        }
        self.emit(ModRM::reg_reg(reg.encoding(), rm.encoding()).encode());
    }

    /// `REX.W op /ext` on a register-direct operand
    fn emit_ext(&mut self, opcode: u8, ext: u8, rm: Reg64) {
        self.emit(Rex::new().w().b_for(rm).encode());
        self.emit(opcode);
        self.emit(ModRM::reg_reg(ext, rm.encoding()).encode());
    }

    /// `REX.W op /r` with a `[base + disp32]` memory operand
    fn emit_mem(&mut self, opcode: u8, reg: Reg64, base: Reg64, disp: i32) {
        self.emit(Rex::new().w().r_for(reg).b_for(base).encode());
        self.emit(opcode);
        self.emit(ModRM::mem_disp32(reg.encoding(), base.encoding()).encode());
        // rsp and r12 as a base need a SIB byte with no index
        if base.encoding() == 0b100 {
            self.emit(0x24);
        }
        self.emit_i32(disp);
    }

    // ==================== Data Movement ====================

    /// MOV r64, imm64 (movabs); returns the offset of the immediate
    pub fn mov_r64_imm64(&mut self, dst: Reg64, imm: u64) -> usize {
        self.emit(Rex::new().w().b_for(dst).encode());
        self.emit(0xB8 + dst.encoding()); // B8+rd
        let offset = self.offset();
        self.emit_u64(imm);
        offset
    }

    /// MOV r64, imm32 (sign-extended)
    pub fn mov_r64_imm32(&mut self, dst: Reg64, imm: i32) {
        self.emit_ext(0xC7, 0, dst); // C7 /0
        self.emit_i32(imm);
    }

    /// MOV r64, r64
    pub fn mov_r64_r64(&mut self, dst: Reg64, src: Reg64) {
        self.emit_rr(&[0x89], src, dst); // 89 /r
    }

    /// MOV r64, [base + disp32]
    pub fn mov_r64_m64(&mut self, dst: Reg64, base: Reg64, disp: i32) {
        self.emit_mem(0x8B, dst, base, disp); // 8B /r
    }

    /// MOV [base + disp32], r64
    pub fn mov_m64_r64(&mut self, base: Reg64, disp: i32, src: Reg64) {
        self.emit_mem(0x89, src, base, disp); // 89 /r
    }

    /// CMOVcc r64, r64
    pub fn cmov_r64_r64(&mut self, cond: Cond, dst: Reg64, src: Reg64) {
        self.emit_rr(&[0x0F, cond.cmov_opcode()], dst, src); // 0F 4x /r
    }

    // ==================== Arithmetic ====================

    /// ADD r64, r64
    pub fn add_r64_r64(&mut self, dst: Reg64, src: Reg64) {
        self.emit_rr(&[0x01], src, dst); // 01 /r
    }

    /// ADD r64, imm32 (sign-extended)
    pub fn add_r64_imm32(&mut self, dst: Reg64, imm: i32) {
        self.emit_ext(0x81, 0, dst); // 81 /0
        self.emit_i32(imm);
    }

    /// SUB r64, r64
    pub fn sub_r64_r64(&mut self, dst: Reg64, src: Reg64) {
        self.emit_rr(&[0x29], src, dst); // 29 /r
    }

    /// SUB r64, imm32 (sign-extended)
    pub fn sub_r64_imm32(&mut self, dst: Reg64, imm: i32) {
        self.emit_ext(0x81, 5, dst); // 81 /5
        self.emit_i32(imm);
    }

    /// IMUL r64, r64
    pub fn imul_r64_r64(&mut self, dst: Reg64, src: Reg64) {
        self.emit_rr(&[0x0F, 0xAF], dst, src); // 0F AF /r
    }

    /// CQO (sign-extend RAX into RDX:RAX for division)
    pub fn cqo(&mut self) {
        self.emit(Rex::new().w().encode());
        self.emit(0x99);
    }

    /// IDIV r64 (signed divide RDX:RAX by r64, quotient in RAX, remainder in RDX)
    pub fn idiv_r64(&mut self, divisor: Reg64) {
        self.emit_ext(0xF7, 7, divisor); // F7 /7
    }

    /// NEG r64
    pub fn neg_r64(&mut self, dst: Reg64) {
        self.emit_ext(0xF7, 3, dst); // F7 /3
    }

    /// SAR r64, imm8
    pub fn sar_r64_imm8(&mut self, dst: Reg64, amount: u8) {
        self.emit_ext(0xC1, 7, dst); // C1 /7 ib
        self.emit(amount);
    }

    /// SHL r64, imm8
    pub fn shl_r64_imm8(&mut self, dst: Reg64, amount: u8) {
        self.emit_ext(0xC1, 4, dst); // C1 /4 ib
        self.emit(amount);
    }

    // ==================== Bitwise Operations ====================

    /// AND r64, r64
    pub fn and_r64_r64(&mut self, dst: Reg64, src: Reg64) {
        self.emit_rr(&[0x21], src, dst); // 21 /r
    }

    /// OR r64, r64
    pub fn or_r64_r64(&mut self, dst: Reg64, src: Reg64) {
        self.emit_rr(&[0x09], src, dst); // 09 /r
    }

    /// XOR r64, imm32 (sign-extended)
    pub fn xor_r64_imm32(&mut self, dst: Reg64, imm: i32) {
        self.emit_ext(0x81, 6, dst); // 81 /6
        self.emit_i32(imm);
    }

    // ==================== Comparison ====================

    /// CMP r64, r64
    pub fn cmp_r64_r64(&mut self, left: Reg64, right: Reg64) {
        self.emit_rr(&[0x39], right, left); // 39 /r
    }

    /// CMP r64, imm32
    pub fn cmp_r64_imm32(&mut self, left: Reg64, imm: i32) {
        self.emit_ext(0x81, 7, left); // 81 /7
        self.emit_i32(imm);
    }

    // ==================== Stack Operations ====================

    /// PUSH r64
    pub fn push_r64(&mut self, reg: Reg64) {
        if reg.needs_rex_ext() {
            self.emit(Rex::new().b_for(reg).encode());
        }
        self.emit(0x50 + reg.encoding()); // 50+rd
    }

    /// POP r64
    pub fn pop_r64(&mut self, reg: Reg64) {
        if reg.needs_rex_ext() {
            self.emit(Rex::new().b_for(reg).encode());
        }
        self.emit(0x58 + reg.encoding()); // 58+rd
    }

    /// LEAVE (mov rsp, rbp; pop rbp)
    pub fn leave(&mut self) {
        self.emit(0xC9);
    }

    // ==================== Control Flow ====================

    /// RET
    pub fn ret(&mut self) {
        self.emit(0xC3);
    }

    /// CALL r64
    pub fn call_r64(&mut self, target: Reg64) {
        if target.needs_rex_ext() {
            self.emit(Rex::new().b_for(target).encode());
        }
        self.emit(0xFF); // FF /2
        self.emit(ModRM::reg_reg(2, target.encoding()).encode());
    }

    /// JMP rel32 (near jump, returns offset of the displacement for patching)
    pub fn jmp_rel32(&mut self) -> usize {
        self.emit(0xE9); // E9 cd
        let offset = self.offset();
        self.emit_i32(0);
        offset
    }

    /// JMP rel8 (short jump, returns offset of the displacement for patching)
    pub fn jmp_rel8(&mut self) -> usize {
        self.emit(0xEB); // EB cb
        let offset = self.offset();
        self.emit(0);
        offset
    }

    /// JE rel32 (jump if equal, returns offset of the displacement)
    pub fn je_rel32(&mut self) -> usize {
        self.emit(0x0F);
        self.emit(0x84); // 0F 84 cd
        let offset = self.offset();
        self.emit_i32(0);
        offset
    }
}
