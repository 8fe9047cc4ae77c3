/// AAPCS64 trampoline generator
///
/// Entry registers: X0 = argument vector base, X1 = argument count,
/// X2 = return slot; the base and slot move into X19/X20 (callee
/// saved). Eight integer registers X0-X7, eight float registers V0-V7,
/// spills at [SP+0] upward, 128-bit values in two adjacent X registers
/// and returned in X1:X0. The call target is materialized into X16 so
/// no argument register is live at the BLR.
use super::{
    emit_add_imm, emit_blr, emit_ldp_post, emit_ldr_d, emit_ldr_s, emit_ldr_w, emit_ldr_x,
    emit_ldrb, emit_ldrh, emit_ldrsb, emit_ldrsh, emit_ldrsw, emit_mov_imm64, emit_mov_reg,
    emit_ret, emit_stp_pre, emit_str_d, emit_str_s, emit_str_w, emit_str_x, emit_strb, emit_strh,
    emit_sub_imm, FP, LR, SP, V0, V16, X0, X1, X10, X11, X16, X19, X2, X20, X9,
};
use crate::codegen::backend::AbiEmitter;
use crate::codegen::plan::{align_reservation, plan, Placement, RegisterFile};
use crate::error::FfiError;
use crate::signature::Signature;
use crate::types::{Extension, TypeKind};

const ARGS_BASE: u8 = X19;
const RET_SLOT: u8 = X20;
const VALUE_PTR: u8 = X9;

const REGS: RegisterFile = RegisterFile {
    int_regs: 8,
    float_regs: 8,
    positional: false,
    indirect_pair_return: false,
};

pub struct AapcsEmitter;

impl AbiEmitter for AapcsEmitter {
    fn name(&self) -> &'static str {
        "aapcs64"
    }

    fn emit(&self, sig: &Signature) -> Result<Vec<u8>, FfiError> {
        let plan = plan(sig, &REGS)?;
        // The paired saves keep SP 16-byte aligned; the reservation is
        // rounded so the BLR happens on an aligned SP as well. A
        // reservation or offset past the imm12 field fails construction
        // instead of truncating.
        let reservation = align_reservation(plan.stack_bytes);
        let mut code = Vec::with_capacity(128);

        emit_stp_pre(&mut code, FP, LR, SP, -16);
        emit_add_imm(&mut code, FP, SP, 0)?;
        emit_stp_pre(&mut code, X19, X20, SP, -16);
        emit_mov_reg(&mut code, ARGS_BASE, X0);
        emit_mov_reg(&mut code, RET_SLOT, X2);
        if reservation > 0 {
            emit_sub_imm(&mut code, SP, SP, reservation)?;
        }

        for (index, (kind, placement)) in plan.placements.iter().enumerate() {
            emit_ldr_x(&mut code, VALUE_PTR, ARGS_BASE, (index * 8) as i32)?;
            match *placement {
                Placement::IntReg(reg) => emit_int_load(&mut code, *kind, reg)?,
                Placement::IntRegPair(reg) => {
                    emit_ldr_x(&mut code, reg, VALUE_PTR, 0)?;
                    emit_ldr_x(&mut code, reg + 1, VALUE_PTR, 8)?;
                }
                Placement::FloatReg(reg) => {
                    if *kind == TypeKind::F32 {
                        emit_ldr_s(&mut code, reg, VALUE_PTR, 0)?;
                    } else {
                        emit_ldr_d(&mut code, reg, VALUE_PTR, 0)?;
                    }
                }
                Placement::Stack(offset) => emit_stack_spill(&mut code, *kind, offset as i32)?,
                Placement::StackPair(offset) => {
                    emit_ldr_x(&mut code, X10, VALUE_PTR, 0)?;
                    emit_ldr_x(&mut code, X11, VALUE_PTR, 8)?;
                    emit_str_x(&mut code, X10, SP, offset as i32)?;
                    emit_str_x(&mut code, X11, SP, offset as i32 + 8)?;
                }
            }
        }

        emit_mov_imm64(&mut code, X16, sig.target() as u64);
        emit_blr(&mut code, X16);
        emit_return_store(&mut code, sig.return_kind())?;

        if reservation > 0 {
            emit_add_imm(&mut code, SP, SP, reservation)?;
        }
        emit_ldp_post(&mut code, X19, X20, SP, 16);
        emit_ldp_post(&mut code, FP, LR, SP, 16);
        emit_ret(&mut code);

        Ok(code)
    }
}

/// Loads the pointee at `[X9]` into argument register `Xreg`/`Wreg`
/// with the kind's width and extension rule.
fn emit_int_load(code: &mut Vec<u8>, kind: TypeKind, reg: u8) -> Result<(), FfiError> {
    match (kind.width(), kind.extension()) {
        (1, Extension::Sign) => emit_ldrsb(code, reg, VALUE_PTR, 0),
        (1, Extension::Zero) => emit_ldrb(code, reg, VALUE_PTR, 0),
        (2, Extension::Sign) => emit_ldrsh(code, reg, VALUE_PTR, 0),
        (2, Extension::Zero) => emit_ldrh(code, reg, VALUE_PTR, 0),
        (4, Extension::Sign) => emit_ldrsw(code, reg, VALUE_PTR, 0),
        (4, Extension::Zero) => emit_ldr_w(code, reg, VALUE_PTR, 0),
        _ => emit_ldr_x(code, reg, VALUE_PTR, 0),
    }
}

/// Spills one single-slot argument to `[SP + offset]`.
fn emit_stack_spill(code: &mut Vec<u8>, kind: TypeKind, offset: i32) -> Result<(), FfiError> {
    match kind {
        TypeKind::F32 => {
            emit_ldr_s(code, V16, VALUE_PTR, 0)?;
            emit_str_s(code, V16, SP, offset)
        }
        TypeKind::F64 => {
            emit_ldr_d(code, V16, VALUE_PTR, 0)?;
            emit_str_d(code, V16, SP, offset)
        }
        _ => {
            emit_int_load(code, kind, X10)?;
            emit_str_x(code, X10, SP, offset)
        }
    }
}

/// Stores the return value from X0/X1:X0/V0 through X20.
fn emit_return_store(code: &mut Vec<u8>, kind: TypeKind) -> Result<(), FfiError> {
    match kind {
        TypeKind::Void => Ok(()),
        TypeKind::F32 => emit_str_s(code, V0, RET_SLOT, 0),
        TypeKind::F64 => emit_str_d(code, V0, RET_SLOT, 0),
        TypeKind::I128 | TypeKind::U128 => {
            emit_str_x(code, X0, RET_SLOT, 0)?;
            emit_str_x(code, X1, RET_SLOT, 8)
        }
        _ => match kind.width() {
            1 => emit_strb(code, X0, RET_SLOT, 0),
            2 => emit_strh(code, X0, RET_SLOT, 0),
            4 => emit_str_w(code, X0, RET_SLOT, 0),
            _ => emit_str_x(code, X0, RET_SLOT, 0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit(ret: TypeKind, params: Vec<TypeKind>) -> Vec<u32> {
        let sig =
            Signature::new("t", ret, params, 0x0000_aabb_ccdd_1122_usize as *const _).unwrap();
        AapcsEmitter
            .emit(&sig)
            .unwrap()
            .chunks(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn nullary_void_trampoline_is_exact() {
        let words = emit(TypeKind::Void, vec![]);
        assert_eq!(
            words,
            vec![
                0xa9bf_7bfd, // stp x29, x30, [sp, #-16]!
                0x9100_03fd, // mov x29, sp
                0xa9bf_53f3, // stp x19, x20, [sp, #-16]!
                0xaa00_03f3, // mov x19, x0
                0xaa02_03f4, // mov x20, x2
                0xd282_2450, // movz x16, #0x1122
                0xf2b9_9bb0, // movk x16, #0xccdd, lsl #16
                0xf2d5_5770, // movk x16, #0xaabb, lsl #32
                0xd63f_0200, // blr x16
                0xa8c1_53f3, // ldp x19, x20, [sp], #16
                0xa8c1_7bfd, // ldp x29, x30, [sp], #16
                0xd65f_03c0, // ret
            ]
        );
    }

    #[test]
    fn ninth_integer_spills_to_sp() {
        let words = emit(TypeKind::I64, vec![TypeKind::I64; 9]);
        // sub sp, sp, #16 and add sp, sp, #16
        assert!(words.contains(&0xd100_43ff));
        assert!(words.contains(&0x9100_43ff));
        // ldr x10, [x9]; str x10, [sp]
        assert!(words.contains(&0xf940_012a));
        assert!(words.contains(&0xf900_03ea));
    }

    #[test]
    fn int_arguments_use_extension_directed_loads() {
        let words = emit(
            TypeKind::Void,
            vec![TypeKind::I8, TypeKind::U16, TypeKind::I32, TypeKind::U32],
        );
        assert!(words.contains(&0x3980_0120)); // ldrsb x0, [x9]
        assert!(words.contains(&0x7940_0121)); // ldrh w1, [x9]
        assert!(words.contains(&0xb980_0122)); // ldrsw x2, [x9]
        assert!(words.contains(&0xb940_0123)); // ldr w3, [x9]
    }

    #[test]
    fn float_arguments_fill_v_registers() {
        let words = emit(TypeKind::F64, vec![TypeKind::F32, TypeKind::F64]);
        assert!(words.contains(&0xbd40_0120)); // ldr s0, [x9]
        assert!(words.contains(&0xfd40_0121)); // ldr d1, [x9]
        assert!(words.contains(&0xfd00_0280)); // str d0, [x20]
    }

    #[test]
    fn int128_fills_adjacent_registers_and_returns_in_two() {
        let words = emit(TypeKind::I128, vec![TypeKind::I128]);
        assert!(words.contains(&0xf940_0120)); // ldr x0, [x9]
        assert!(words.contains(&0xf940_0521)); // ldr x1, [x9, #8]
        assert!(words.contains(&0xf900_0280)); // str x0, [x20]
        assert!(words.contains(&0xf900_0681)); // str x1, [x20, #8]
    }

    #[test]
    fn narrow_return_uses_a_narrow_store() {
        let words = emit(TypeKind::Bool, vec![]);
        assert!(words.contains(&0x3900_0280)); // strb w0, [x20]
        let words = emit(TypeKind::I16, vec![]);
        assert!(words.contains(&0x7900_0280)); // strh w0, [x20]
    }

    #[test]
    fn value_pointers_load_from_the_vector_base() {
        let words = emit(TypeKind::Void, vec![TypeKind::I64, TypeKind::I64]);
        assert!(words.contains(&0xf940_0269)); // ldr x9, [x19]
        assert!(words.contains(&0xf940_0669)); // ldr x9, [x19, #8]
    }

    #[test]
    fn oversized_stack_reservation_fails_construction() {
        // 600 integer arguments spill 4736 bytes, past the imm12 range
        // of the SP adjustment.
        let sig = Signature::new(
            "big",
            TypeKind::Void,
            vec![TypeKind::I64; 600],
            std::ptr::null(),
        )
        .unwrap();
        assert!(matches!(
            AapcsEmitter.emit(&sig),
            Err(FfiError::EncodingOverflow { .. })
        ));
    }

    #[test]
    fn argument_index_past_the_immediate_range_fails_construction() {
        let sig = Signature::new(
            "huge",
            TypeKind::Void,
            vec![TypeKind::Pointer; 4097],
            std::ptr::null(),
        )
        .unwrap();
        assert!(matches!(
            AapcsEmitter.emit(&sig),
            Err(FfiError::EncodingOverflow { .. })
        ));
    }
}
