/// Microsoft x64 trampoline generator
///
/// Entry registers: RCX = argument vector base, RDX = argument count,
/// R8 = return slot; the base and slot move into R13/R14. Four shared
/// argument positions (RCX/RDX/R8/R9 or XMM0..XMM3), 32 bytes of shadow
/// space under the spilled arguments, and 128-bit returns through a
/// hidden pointer passed in RCX that shifts every position by one.
use super::{
    emit_add_rsp, emit_call_reg, emit_int_load, emit_load_u64, emit_mov_imm64, emit_mov_rr,
    emit_movsd_load, emit_movss_load, emit_pop, emit_push, emit_ret, emit_return_store,
    emit_stack_spill, emit_stack_spill_pair, emit_sub_rsp, Gpr, Xmm, VALUE_PTR,
};
use crate::codegen::backend::AbiEmitter;
use crate::codegen::plan::{align_reservation, plan, Placement, RegisterFile};
use crate::error::FfiError;
use crate::signature::Signature;
use crate::types::TypeKind;

const INT_ARGS: [Gpr; 4] = [Gpr::Rcx, Gpr::Rdx, Gpr::R8, Gpr::R9];
const ARGS_BASE: Gpr = Gpr::R13;
const RET_SLOT: Gpr = Gpr::R14;

/// Callee-reserved scratch area above the return address.
const SHADOW_SPACE: u32 = 32;

const REGS: RegisterFile = RegisterFile {
    int_regs: 4,
    float_regs: 4,
    positional: true,
    indirect_pair_return: true,
};

pub struct Win64Emitter;

impl AbiEmitter for Win64Emitter {
    fn name(&self) -> &'static str {
        "win64"
    }

    fn emit(&self, sig: &Signature) -> Result<Vec<u8>, FfiError> {
        let plan = plan(sig, &REGS)?;
        // Shadow space is owed even for register-only calls; the three
        // pushes leave RSP 16-byte aligned, so the reservation is
        // rounded to keep the call site aligned.
        let reservation = align_reservation(SHADOW_SPACE + plan.stack_bytes) as i32;
        let mut code = Vec::with_capacity(128);

        emit_push(&mut code, Gpr::Rbp);
        emit_mov_rr(&mut code, Gpr::Rbp, Gpr::Rsp);
        emit_push(&mut code, ARGS_BASE);
        emit_mov_rr(&mut code, ARGS_BASE, Gpr::Rcx);
        emit_push(&mut code, RET_SLOT);
        emit_mov_rr(&mut code, RET_SLOT, Gpr::R8);
        emit_sub_rsp(&mut code, reservation);

        if plan.indirect_return {
            // The callee writes its 128-bit result through RCX and the
            // first real argument shifts to the next position.
            emit_mov_rr(&mut code, Gpr::Rcx, RET_SLOT);
        }

        for (index, (kind, placement)) in plan.placements.iter().enumerate() {
            emit_load_u64(&mut code, VALUE_PTR, ARGS_BASE, (index * 8) as i32);
            match *placement {
                Placement::IntReg(reg) => {
                    emit_int_load(&mut code, *kind, INT_ARGS[reg as usize], VALUE_PTR);
                }
                Placement::IntRegPair(reg) => {
                    emit_load_u64(&mut code, INT_ARGS[reg as usize], VALUE_PTR, 0);
                    emit_load_u64(&mut code, INT_ARGS[reg as usize + 1], VALUE_PTR, 8);
                }
                Placement::FloatReg(reg) => {
                    if *kind == TypeKind::F32 {
                        emit_movss_load(&mut code, Xmm::arg(reg), VALUE_PTR, 0);
                    } else {
                        emit_movsd_load(&mut code, Xmm::arg(reg), VALUE_PTR, 0);
                    }
                }
                Placement::Stack(offset) => {
                    emit_stack_spill(&mut code, *kind, (SHADOW_SPACE + offset) as i32);
                }
                Placement::StackPair(offset) => {
                    emit_stack_spill_pair(&mut code, (SHADOW_SPACE + offset) as i32);
                }
            }
        }

        emit_mov_imm64(&mut code, Gpr::Rax, sig.target() as u64);
        emit_call_reg(&mut code, Gpr::Rax);
        if !plan.indirect_return {
            emit_return_store(&mut code, sig.return_kind(), RET_SLOT);
        }

        emit_add_rsp(&mut code, reservation);
        emit_pop(&mut code, RET_SLOT);
        emit_pop(&mut code, ARGS_BASE);
        emit_pop(&mut code, Gpr::Rbp);
        emit_ret(&mut code);

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit(ret: TypeKind, params: Vec<TypeKind>) -> Vec<u8> {
        let sig =
            Signature::new("t", ret, params, 0x0807_0605_0403_0201_usize as *const _).unwrap();
        Win64Emitter.emit(&sig).unwrap()
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn shadow_space_is_reserved_even_without_arguments() {
        let code = emit(TypeKind::Void, vec![]);
        // sub rsp, 32 / add rsp, 32
        assert!(contains(&code, &[0x48, 0x83, 0xec, 0x20]));
        assert!(contains(&code, &[0x48, 0x83, 0xc4, 0x20]));
    }

    #[test]
    fn entry_registers_move_to_callee_saved_homes() {
        let code = emit(TypeKind::Void, vec![]);
        // mov r13, rcx; mov r14, r8
        assert!(contains(&code, &[0x49, 0x89, 0xcd]));
        assert!(contains(&code, &[0x4d, 0x89, 0xc6]));
    }

    #[test]
    fn fifth_argument_lands_above_the_shadow_space() {
        let code = emit(TypeKind::I32, vec![TypeKind::I32; 5]);
        // reservation = 32 shadow + 8 spill, rounded to 48
        assert!(contains(&code, &[0x48, 0x83, 0xec, 0x30]));
        // mov [rsp + 32], r11
        assert!(contains(&code, &[0x4c, 0x89, 0x5c, 0x24, 0x20]));
    }

    #[test]
    fn float_positions_track_integer_positions() {
        let code = emit(
            TypeKind::Void,
            vec![TypeKind::I32, TypeKind::F64, TypeKind::F32, TypeKind::I64],
        );
        // second argument in xmm1: movsd xmm1, [r10]
        assert!(contains(&code, &[0xf2, 0x41, 0x0f, 0x10, 0x0a]));
        // third argument in xmm2: movss xmm2, [r10]
        assert!(contains(&code, &[0xf3, 0x41, 0x0f, 0x10, 0x12]));
        // fourth argument in r9: mov r9, [r10]
        assert!(contains(&code, &[0x4d, 0x8b, 0x0a]));
    }

    #[test]
    fn pair_return_passes_the_slot_in_rcx_and_shifts_arguments() {
        let code = emit(TypeKind::U128, vec![TypeKind::I64]);
        // mov rcx, r14 before marshalling
        assert!(contains(&code, &[0x4c, 0x89, 0xf1]));
        // the shifted first argument loads into rdx: mov rdx, [r10]
        assert!(contains(&code, &[0x49, 0x8b, 0x12]));
        // no post-call store through r14
        assert!(!contains(&code, &[0x49, 0x89, 0x06]));
        assert!(!contains(&code, &[0x49, 0x89, 0x56, 0x08]));
    }

    #[test]
    fn pair_argument_consumes_two_positions() {
        let code = emit(TypeKind::Void, vec![TypeKind::I128, TypeKind::I32]);
        // low half in rcx, high half in rdx
        assert!(contains(&code, &[0x49, 0x8b, 0x0a]));
        assert!(contains(&code, &[0x49, 0x8b, 0x52, 0x08]));
        // following argument in r8: movsxd r8, dword [r10]
        assert!(contains(&code, &[0x4d, 0x63, 0x02]));
    }

    #[test]
    fn no_endbranch_marker_is_emitted() {
        let code = emit(TypeKind::Void, vec![]);
        assert!(!contains(&code, &[0xf3, 0x0f, 0x1e, 0xfa]));
    }

    #[test]
    fn wide_reservations_use_the_imm32_form() {
        // 13 spilled slots: 32 + 104 = 136 -> no imm8 encoding
        let code = emit(TypeKind::Void, vec![TypeKind::I64; 17]);
        assert!(contains(&code, &[0x48, 0x81, 0xec, 0x90, 0x00, 0x00, 0x00]));
        assert!(contains(&code, &[0x48, 0x81, 0xc4, 0x90, 0x00, 0x00, 0x00]));
    }
}
