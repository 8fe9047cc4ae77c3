/// A64 instruction encoder
///
/// Fixed-width 4-byte words appended little-endian. Register operands
/// are hardware numbers; `SP` shares number 31 with XZR, and the
/// functions that accept it (ADD/SUB immediate, loads and stores) are
/// exactly the ones where 31 means the stack pointer. Load/store
/// offsets use the scaled unsigned-immediate forms; an offset the
/// imm12 field cannot represent is refused so construction fails
/// instead of publishing a wrong encoding.
///
/// Submodules:
/// - `aapcs`: AAPCS64 trampoline generator
pub mod aapcs;

use crate::error::FfiError;

pub const X0: u8 = 0;
pub const X1: u8 = 1;
pub const X2: u8 = 2;
pub const X9: u8 = 9;
pub const X10: u8 = 10;
pub const X11: u8 = 11;
pub const X16: u8 = 16;
pub const X19: u8 = 19;
pub const X20: u8 = 20;
pub const FP: u8 = 29;
pub const LR: u8 = 30;
pub const SP: u8 = 31;

/// Float/SIMD register numbers; V16 is the spill scratch (caller-saved,
/// never an argument).
pub const V0: u8 = 0;
pub const V16: u8 = 16;

fn emit_u32(code: &mut Vec<u8>, insn: u32) {
    code.extend_from_slice(&insn.to_le_bytes());
}

fn scaled_offset(offset: i32, scale: u32) -> Result<u32, FfiError> {
    let unit = 1 << scale;
    let max = 4095 * unit as usize;
    if offset < 0 || offset % unit != 0 {
        return Err(FfiError::EncodingOverflow {
            written: offset.unsigned_abs() as usize,
            capacity: max,
        });
    }
    let imm = (offset / unit) as u32;
    if imm > 4095 {
        return Err(FfiError::EncodingOverflow {
            written: offset as usize,
            capacity: max,
        });
    }
    Ok(imm << 10)
}

/// `stp rt, rt2, [sp, #imm]!` (pre-index, 64-bit).
pub fn emit_stp_pre(code: &mut Vec<u8>, rt: u8, rt2: u8, rn: u8, imm: i32) {
    debug_assert!(imm % 8 == 0);
    let imm7 = ((imm / 8) as u32) & 0x7f;
    emit_u32(
        code,
        0xa980_0000 | imm7 << 15 | (rt2 as u32) << 10 | (rn as u32) << 5 | rt as u32,
    );
}

/// `ldp rt, rt2, [sp], #imm` (post-index, 64-bit).
pub fn emit_ldp_post(code: &mut Vec<u8>, rt: u8, rt2: u8, rn: u8, imm: i32) {
    debug_assert!(imm % 8 == 0);
    let imm7 = ((imm / 8) as u32) & 0x7f;
    emit_u32(
        code,
        0xa8c0_0000 | imm7 << 15 | (rt2 as u32) << 10 | (rn as u32) << 5 | rt as u32,
    );
}

/// `mov xd, xm` via `orr xd, xzr, xm`. Not valid for SP.
pub fn emit_mov_reg(code: &mut Vec<u8>, dst: u8, src: u8) {
    emit_u32(code, 0xaa00_03e0 | (src as u32) << 16 | dst as u32);
}

/// `add xd, xn, #imm`; with `xn = SP` this is the SP-relative move.
pub fn emit_add_imm(code: &mut Vec<u8>, dst: u8, src: u8, imm: u32) -> Result<(), FfiError> {
    let imm12 = encode_imm12(imm)?;
    emit_u32(code, 0x9100_0000 | imm12 | (src as u32) << 5 | dst as u32);
    Ok(())
}

/// `sub xd, xn, #imm`.
pub fn emit_sub_imm(code: &mut Vec<u8>, dst: u8, src: u8, imm: u32) -> Result<(), FfiError> {
    let imm12 = encode_imm12(imm)?;
    emit_u32(code, 0xd100_0000 | imm12 | (src as u32) << 5 | dst as u32);
    Ok(())
}

fn encode_imm12(imm: u32) -> Result<u32, FfiError> {
    if imm > 4095 {
        return Err(FfiError::EncodingOverflow {
            written: imm as usize,
            capacity: 4095,
        });
    }
    Ok(imm << 10)
}

/// Materializes a 64-bit constant with MOVZ and up to three MOVKs,
/// skipping all-zero 16-bit chunks.
pub fn emit_mov_imm64(code: &mut Vec<u8>, dst: u8, value: u64) {
    let parts = [
        (value & 0xffff) as u32,
        (value >> 16 & 0xffff) as u32,
        (value >> 32 & 0xffff) as u32,
        (value >> 48 & 0xffff) as u32,
    ];

    let first = match parts.iter().position(|part| *part != 0) {
        Some(index) => index,
        None => {
            emit_u32(code, 0xd280_0000 | dst as u32);
            return;
        }
    };

    emit_u32(
        code,
        0xd280_0000 | (first as u32) << 21 | parts[first] << 5 | dst as u32,
    );
    for (hw, part) in parts.iter().enumerate().skip(first + 1) {
        if *part != 0 {
            emit_u32(code, 0xf280_0000 | (hw as u32) << 21 | part << 5 | dst as u32);
        }
    }
}

pub fn emit_blr(code: &mut Vec<u8>, rn: u8) {
    emit_u32(code, 0xd63f_0000 | (rn as u32) << 5);
}

pub fn emit_ret(code: &mut Vec<u8>) {
    emit_u32(code, 0xd65f_03c0);
}

/// `ldrb wt, [xn, #off]`; zero-extends to the full register.
pub fn emit_ldrb(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0x3940_0000 | scaled_offset(off, 0)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `ldrsb xt, [xn, #off]`; sign-extends to 64 bits.
pub fn emit_ldrsb(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0x3980_0000 | scaled_offset(off, 0)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `ldrh wt, [xn, #off]`.
pub fn emit_ldrh(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0x7940_0000 | scaled_offset(off, 1)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `ldrsh xt, [xn, #off]`.
pub fn emit_ldrsh(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0x7980_0000 | scaled_offset(off, 1)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `ldr wt, [xn, #off]`; zero-extends to the full register.
pub fn emit_ldr_w(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xb940_0000 | scaled_offset(off, 2)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `ldrsw xt, [xn, #off]`.
pub fn emit_ldrsw(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xb980_0000 | scaled_offset(off, 2)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `ldr xt, [xn, #off]`.
pub fn emit_ldr_x(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xf940_0000 | scaled_offset(off, 3)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `strb wt, [xn, #off]`.
pub fn emit_strb(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0x3900_0000 | scaled_offset(off, 0)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `strh wt, [xn, #off]`.
pub fn emit_strh(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0x7900_0000 | scaled_offset(off, 1)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `str wt, [xn, #off]`.
pub fn emit_str_w(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xb900_0000 | scaled_offset(off, 2)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `str xt, [xn, #off]`.
pub fn emit_str_x(code: &mut Vec<u8>, rt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xf900_0000 | scaled_offset(off, 3)? | (rn as u32) << 5 | rt as u32);
    Ok(())
}

/// `ldr st, [xn, #off]` (32-bit float).
pub fn emit_ldr_s(code: &mut Vec<u8>, vt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xbd40_0000 | scaled_offset(off, 2)? | (rn as u32) << 5 | vt as u32);
    Ok(())
}

/// `ldr dt, [xn, #off]` (64-bit float).
pub fn emit_ldr_d(code: &mut Vec<u8>, vt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xfd40_0000 | scaled_offset(off, 3)? | (rn as u32) << 5 | vt as u32);
    Ok(())
}

/// `str st, [xn, #off]`.
pub fn emit_str_s(code: &mut Vec<u8>, vt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xbd00_0000 | scaled_offset(off, 2)? | (rn as u32) << 5 | vt as u32);
    Ok(())
}

/// `str dt, [xn, #off]`.
pub fn emit_str_d(code: &mut Vec<u8>, vt: u8, rn: u8, off: i32) -> Result<(), FfiError> {
    emit_u32(code, 0xfd00_0000 | scaled_offset(off, 3)? | (rn as u32) << 5 | vt as u32);
    Ok(())
}
