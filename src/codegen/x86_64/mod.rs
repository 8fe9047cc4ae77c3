/// Shared x86-64 encoder
///
/// Typed register descriptors and small emit functions the System V and
/// Microsoft x64 generators compose. Every function appends one complete
/// instruction; REX prefixes, ModRM/SIB bytes and displacement widths
/// are derived from the operands, so generator code never spells raw
/// encodings.
///
/// Submodules:
/// - `sysv`: System V AMD64 trampoline generator
/// - `win64`: Microsoft x64 trampoline generator
pub mod sysv;
pub mod win64;

use crate::types::{Extension, TypeKind};

/// General-purpose registers with their hardware numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Gpr {
    /// Low three bits used in ModRM/SIB fields.
    pub fn code(self) -> u8 {
        self as u8 & 7
    }

    /// Registers R8-R15 need a REX extension bit.
    pub fn is_extended(self) -> bool {
        self as u8 >= 8
    }
}

/// SSE registers. XMM0-XMM7 encode without REX.R; XMM8-XMM15 set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Xmm {
    Xmm0 = 0,
    Xmm1 = 1,
    Xmm2 = 2,
    Xmm3 = 3,
    Xmm4 = 4,
    Xmm5 = 5,
    Xmm6 = 6,
    Xmm7 = 7,
    Xmm8 = 8,
    Xmm9 = 9,
    Xmm10 = 10,
    Xmm11 = 11,
    Xmm12 = 12,
    Xmm13 = 13,
    Xmm14 = 14,
    Xmm15 = 15,
}

impl Xmm {
    pub fn code(self) -> u8 {
        self as u8 & 7
    }

    pub fn is_extended(self) -> bool {
        self as u8 >= 8
    }

    /// Argument register by position (XMM0..XMM7).
    pub fn arg(index: u8) -> Xmm {
        match index {
            0 => Xmm::Xmm0,
            1 => Xmm::Xmm1,
            2 => Xmm::Xmm2,
            3 => Xmm::Xmm3,
            4 => Xmm::Xmm4,
            5 => Xmm::Xmm5,
            6 => Xmm::Xmm6,
            7 => Xmm::Xmm7,
            _ => unreachable!("xmm argument index out of range"),
        }
    }
}

fn rex(w: bool, reg_ext: bool, base_ext: bool) -> u8 {
    0x40 | (w as u8) << 3 | (reg_ext as u8) << 2 | base_ext as u8
}

fn rex_opt(code: &mut Vec<u8>, w: bool, reg_ext: bool, base_ext: bool) {
    if w || reg_ext || base_ext {
        code.push(rex(w, reg_ext, base_ext));
    }
}

/// ModRM (+SIB, +displacement) for a `[base + disp]` operand.
///
/// RSP/R12 as base force a SIB byte; RBP/R13 as base cannot use the
/// no-displacement form, so a zero disp8 is emitted for them.
fn mem_operand(code: &mut Vec<u8>, reg: u8, base: Gpr, disp: i32) {
    let base_code = base.code();
    let needs_sib = base_code == 4;
    let mod_bits: u8 = if disp == 0 && base_code != 5 {
        0b00
    } else if (-128..=127).contains(&disp) {
        0b01
    } else {
        0b10
    };
    code.push(mod_bits << 6 | (reg & 7) << 3 | if needs_sib { 4 } else { base_code });
    if needs_sib {
        // scale 1, no index, base from the register's low bits
        code.push(0x24);
    }
    match mod_bits {
        0b01 => code.push(disp as i8 as u8),
        0b10 => code.extend_from_slice(&disp.to_le_bytes()),
        _ => {}
    }
}

pub fn emit_push(code: &mut Vec<u8>, reg: Gpr) {
    if reg.is_extended() {
        code.push(0x41);
    }
    code.push(0x50 + reg.code());
}

pub fn emit_pop(code: &mut Vec<u8>, reg: Gpr) {
    if reg.is_extended() {
        code.push(0x41);
    }
    code.push(0x58 + reg.code());
}

/// `mov dst, src` (64-bit register to register).
pub fn emit_mov_rr(code: &mut Vec<u8>, dst: Gpr, src: Gpr) {
    code.push(rex(true, src.is_extended(), dst.is_extended()));
    code.push(0x89);
    code.push(0xc0 | src.code() << 3 | dst.code());
}

/// `movabs dst, imm` (64-bit immediate materialization).
pub fn emit_mov_imm64(code: &mut Vec<u8>, dst: Gpr, imm: u64) {
    code.push(rex(true, false, dst.is_extended()));
    code.push(0xb8 + dst.code());
    code.extend_from_slice(&imm.to_le_bytes());
}

/// `mov al, imm`, the System V variadic register count.
pub fn emit_mov_al_imm8(code: &mut Vec<u8>, imm: u8) {
    code.push(0xb0);
    code.push(imm);
}

pub fn emit_call_reg(code: &mut Vec<u8>, reg: Gpr) {
    if reg.is_extended() {
        code.push(0x41);
    }
    code.push(0xff);
    code.push(0xd0 | reg.code());
}

pub fn emit_ret(code: &mut Vec<u8>) {
    code.push(0xc3);
}

/// Branch-target marker for CET-enabled loaders.
pub fn emit_endbr64(code: &mut Vec<u8>) {
    code.extend_from_slice(&[0xf3, 0x0f, 0x1e, 0xfa]);
}

pub fn emit_sub_rsp(code: &mut Vec<u8>, bytes: i32) {
    if (0..=127).contains(&bytes) {
        code.extend_from_slice(&[0x48, 0x83, 0xec, bytes as u8]);
    } else {
        code.extend_from_slice(&[0x48, 0x81, 0xec]);
        code.extend_from_slice(&bytes.to_le_bytes());
    }
}

pub fn emit_add_rsp(code: &mut Vec<u8>, bytes: i32) {
    if (0..=127).contains(&bytes) {
        code.extend_from_slice(&[0x48, 0x83, 0xc4, bytes as u8]);
    } else {
        code.extend_from_slice(&[0x48, 0x81, 0xc4]);
        code.extend_from_slice(&bytes.to_le_bytes());
    }
}

/// `movzx dst, byte [base + disp]` into the full register.
pub fn emit_load_u8(code: &mut Vec<u8>, dst: Gpr, base: Gpr, disp: i32) {
    code.push(rex(true, dst.is_extended(), base.is_extended()));
    code.extend_from_slice(&[0x0f, 0xb6]);
    mem_operand(code, dst.code(), base, disp);
}

/// `movsx dst, byte [base + disp]`.
pub fn emit_load_i8(code: &mut Vec<u8>, dst: Gpr, base: Gpr, disp: i32) {
    code.push(rex(true, dst.is_extended(), base.is_extended()));
    code.extend_from_slice(&[0x0f, 0xbe]);
    mem_operand(code, dst.code(), base, disp);
}

/// `movzx dst, word [base + disp]`.
pub fn emit_load_u16(code: &mut Vec<u8>, dst: Gpr, base: Gpr, disp: i32) {
    code.push(rex(true, dst.is_extended(), base.is_extended()));
    code.extend_from_slice(&[0x0f, 0xb7]);
    mem_operand(code, dst.code(), base, disp);
}

/// `movsx dst, word [base + disp]`.
pub fn emit_load_i16(code: &mut Vec<u8>, dst: Gpr, base: Gpr, disp: i32) {
    code.push(rex(true, dst.is_extended(), base.is_extended()));
    code.extend_from_slice(&[0x0f, 0xbf]);
    mem_operand(code, dst.code(), base, disp);
}

/// `movsxd dst, dword [base + disp]`.
pub fn emit_load_i32(code: &mut Vec<u8>, dst: Gpr, base: Gpr, disp: i32) {
    code.push(rex(true, dst.is_extended(), base.is_extended()));
    code.push(0x63);
    mem_operand(code, dst.code(), base, disp);
}

/// `mov dst32, dword [base + disp]`; zero-extends into the full
/// register.
pub fn emit_load_u32(code: &mut Vec<u8>, dst: Gpr, base: Gpr, disp: i32) {
    rex_opt(code, false, dst.is_extended(), base.is_extended());
    code.push(0x8b);
    mem_operand(code, dst.code(), base, disp);
}

/// `mov dst, qword [base + disp]`.
pub fn emit_load_u64(code: &mut Vec<u8>, dst: Gpr, base: Gpr, disp: i32) {
    code.push(rex(true, dst.is_extended(), base.is_extended()));
    code.push(0x8b);
    mem_operand(code, dst.code(), base, disp);
}

/// `mov byte [base + disp], src8`.
pub fn emit_store_u8(code: &mut Vec<u8>, src: Gpr, base: Gpr, disp: i32) {
    rex_opt(code, false, src.is_extended(), base.is_extended());
    code.push(0x88);
    mem_operand(code, src.code(), base, disp);
}

/// `mov word [base + disp], src16`.
pub fn emit_store_u16(code: &mut Vec<u8>, src: Gpr, base: Gpr, disp: i32) {
    code.push(0x66);
    rex_opt(code, false, src.is_extended(), base.is_extended());
    code.push(0x89);
    mem_operand(code, src.code(), base, disp);
}

/// `mov dword [base + disp], src32`.
pub fn emit_store_u32(code: &mut Vec<u8>, src: Gpr, base: Gpr, disp: i32) {
    rex_opt(code, false, src.is_extended(), base.is_extended());
    code.push(0x89);
    mem_operand(code, src.code(), base, disp);
}

/// `mov qword [base + disp], src`.
pub fn emit_store_u64(code: &mut Vec<u8>, src: Gpr, base: Gpr, disp: i32) {
    code.push(rex(true, src.is_extended(), base.is_extended()));
    code.push(0x89);
    mem_operand(code, src.code(), base, disp);
}

fn emit_sse_mov(code: &mut Vec<u8>, prefix: u8, opcode: u8, reg: Xmm, base: Gpr, disp: i32) {
    code.push(prefix);
    rex_opt(code, false, reg.is_extended(), base.is_extended());
    code.extend_from_slice(&[0x0f, opcode]);
    mem_operand(code, reg.code(), base, disp);
}

/// `movss dst, dword [base + disp]`.
pub fn emit_movss_load(code: &mut Vec<u8>, dst: Xmm, base: Gpr, disp: i32) {
    emit_sse_mov(code, 0xf3, 0x10, dst, base, disp);
}

/// `movsd dst, qword [base + disp]`.
pub fn emit_movsd_load(code: &mut Vec<u8>, dst: Xmm, base: Gpr, disp: i32) {
    emit_sse_mov(code, 0xf2, 0x10, dst, base, disp);
}

/// `movss dword [base + disp], src`.
pub fn emit_movss_store(code: &mut Vec<u8>, src: Xmm, base: Gpr, disp: i32) {
    emit_sse_mov(code, 0xf3, 0x11, src, base, disp);
}

/// `movsd qword [base + disp], src`.
pub fn emit_movsd_store(code: &mut Vec<u8>, src: Xmm, base: Gpr, disp: i32) {
    emit_sse_mov(code, 0xf2, 0x11, src, base, disp);
}

// Scratch assignments shared by both x86-64 generators. R10/R11 and
// XMM15 are volatile in both conventions and never carry arguments.
pub(super) const VALUE_PTR: Gpr = Gpr::R10;
pub(super) const SPILL_TMP: Gpr = Gpr::R11;
pub(super) const FLOAT_SPILL_TMP: Xmm = Xmm::Xmm15;

/// Loads an integer-class pointee at `[base]` into `dst` with the
/// kind's width and extension rule.
pub(super) fn emit_int_load(code: &mut Vec<u8>, kind: TypeKind, dst: Gpr, base: Gpr) {
    match (kind.width(), kind.extension()) {
        (1, Extension::Sign) => emit_load_i8(code, dst, base, 0),
        (1, Extension::Zero) => emit_load_u8(code, dst, base, 0),
        (2, Extension::Sign) => emit_load_i16(code, dst, base, 0),
        (2, Extension::Zero) => emit_load_u16(code, dst, base, 0),
        (4, Extension::Sign) => emit_load_i32(code, dst, base, 0),
        (4, Extension::Zero) => emit_load_u32(code, dst, base, 0),
        _ => emit_load_u64(code, dst, base, 0),
    }
}

/// Spills one single-slot argument: pointee at `[VALUE_PTR]`, slot at
/// `[rsp + disp]`.
pub(super) fn emit_stack_spill(code: &mut Vec<u8>, kind: TypeKind, disp: i32) {
    match kind {
        TypeKind::F32 => {
            emit_movss_load(code, FLOAT_SPILL_TMP, VALUE_PTR, 0);
            emit_movss_store(code, FLOAT_SPILL_TMP, Gpr::Rsp, disp);
        }
        TypeKind::F64 => {
            emit_movsd_load(code, FLOAT_SPILL_TMP, VALUE_PTR, 0);
            emit_movsd_store(code, FLOAT_SPILL_TMP, Gpr::Rsp, disp);
        }
        _ => {
            emit_int_load(code, kind, SPILL_TMP, VALUE_PTR);
            emit_store_u64(code, SPILL_TMP, Gpr::Rsp, disp);
        }
    }
}

/// Spills a 128-bit argument into two adjacent slots.
pub(super) fn emit_stack_spill_pair(code: &mut Vec<u8>, disp: i32) {
    emit_load_u64(code, SPILL_TMP, VALUE_PTR, 0);
    emit_store_u64(code, SPILL_TMP, Gpr::Rsp, disp);
    emit_load_u64(code, SPILL_TMP, VALUE_PTR, 8);
    emit_store_u64(code, SPILL_TMP, Gpr::Rsp, disp + 8);
}

/// Stores the native return value from RAX/RDX:RAX/XMM0 through the
/// return-slot register with the kind's store width.
pub(super) fn emit_return_store(code: &mut Vec<u8>, kind: TypeKind, ret_slot: Gpr) {
    match kind {
        TypeKind::Void => {}
        TypeKind::F32 => emit_movss_store(code, Xmm::Xmm0, ret_slot, 0),
        TypeKind::F64 => emit_movsd_store(code, Xmm::Xmm0, ret_slot, 0),
        TypeKind::I128 | TypeKind::U128 => {
            emit_store_u64(code, Gpr::Rax, ret_slot, 0);
            emit_store_u64(code, Gpr::Rdx, ret_slot, 8);
        }
        _ => match kind.width() {
            1 => emit_store_u8(code, Gpr::Rax, ret_slot, 0),
            2 => emit_store_u16(code, Gpr::Rax, ret_slot, 0),
            4 => emit_store_u32(code, Gpr::Rax, ret_slot, 0),
            _ => emit_store_u64(code, Gpr::Rax, ret_slot, 0),
        },
    }
}
