/// System V AMD64 trampoline generator
///
/// Entry registers: RDI = argument vector base, RSI = argument count,
/// RDX = return slot. The base and slot move into R14/R12 (callee
/// saved) so marshalling can freely clobber the argument registers.
/// Six integer registers, eight XMM registers, spills at [RSP+0]
/// upward, AL cleared for the variadic convention, 128-bit values in
/// two adjacent integer registers and returned in RDX:RAX.
use super::{
    emit_add_rsp, emit_call_reg, emit_endbr64, emit_int_load, emit_mov_al_imm8, emit_mov_imm64,
    emit_mov_rr, emit_movsd_load, emit_movss_load, emit_pop, emit_push, emit_ret,
    emit_return_store, emit_stack_spill, emit_stack_spill_pair, emit_sub_rsp, emit_load_u64,
    Gpr, Xmm, VALUE_PTR,
};
use crate::codegen::backend::AbiEmitter;
use crate::codegen::plan::{align_reservation, plan, Placement, RegisterFile};
use crate::error::FfiError;
use crate::signature::Signature;
use crate::types::TypeKind;

const INT_ARGS: [Gpr; 6] = [Gpr::Rdi, Gpr::Rsi, Gpr::Rdx, Gpr::Rcx, Gpr::R8, Gpr::R9];
const ARGS_BASE: Gpr = Gpr::R14;
const RET_SLOT: Gpr = Gpr::R12;

const REGS: RegisterFile = RegisterFile {
    int_regs: 6,
    float_regs: 8,
    positional: false,
    indirect_pair_return: false,
};

pub struct SysVEmitter;

impl AbiEmitter for SysVEmitter {
    fn name(&self) -> &'static str {
        "sysv-amd64"
    }

    fn emit(&self, sig: &Signature) -> Result<Vec<u8>, FfiError> {
        let plan = plan(sig, &REGS)?;
        // Three pushes below leave RSP 16-byte aligned, so the
        // reservation itself must stay a multiple of 16.
        let reservation = align_reservation(plan.stack_bytes) as i32;
        let mut code = Vec::with_capacity(128);

        emit_endbr64(&mut code);
        emit_push(&mut code, Gpr::Rbp);
        emit_mov_rr(&mut code, Gpr::Rbp, Gpr::Rsp);
        emit_push(&mut code, ARGS_BASE);
        emit_mov_rr(&mut code, ARGS_BASE, Gpr::Rdi);
        emit_push(&mut code, RET_SLOT);
        emit_mov_rr(&mut code, RET_SLOT, Gpr::Rdx);
        if reservation > 0 {
            emit_sub_rsp(&mut code, reservation);
        }
        // Fixed-signature call: zero vector registers for a variadic
        // prologue that might inspect AL.
        emit_mov_al_imm8(&mut code, 0);

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
                    emit_stack_spill(&mut code, *kind, offset as i32);
                }
                Placement::StackPair(offset) => {
                    emit_stack_spill_pair(&mut code, offset as i32);
                }
            }
        }

        emit_mov_imm64(&mut code, Gpr::Rax, sig.target() as u64);
        emit_call_reg(&mut code, Gpr::Rax);
        emit_return_store(&mut code, sig.return_kind(), RET_SLOT);

        if reservation > 0 {
            emit_add_rsp(&mut code, reservation);
        }
        emit_pop(&mut code, RET_SLOT);
        emit_pop(&mut code, ARGS_BASE);
        emit_pop(&mut code, Gpr::Rbp);
        emit_ret(&mut code);

        Ok(code)
    }
}
