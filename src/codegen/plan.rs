/// Register and stack-slot assignment for one call
///
/// All three conventions allocate left to right from a pool of integer
/// registers, a pool of float registers, and 8-byte stack slots. The
/// differences are pool sizes, whether the two pools share one position
/// counter (Win64), and whether a 128-bit return steals the first
/// integer register for a hidden pointer. Computing the assignment once
/// here keeps the generators free of counting logic.
use crate::error::FfiError;
use crate::signature::Signature;
use crate::types::{AbiClass, TypeKind};

/// Pool shape of one calling convention.
#[derive(Debug, Clone, Copy)]
pub struct RegisterFile {
    pub int_regs: u8,
    pub float_regs: u8,
    /// Integer and float parameters consume the same position counter
    /// (Microsoft x64) instead of independent per-class counters.
    pub positional: bool,
    /// 128-bit returns travel through a hidden pointer in the first
    /// integer register, shifting every later integer position by one.
    pub indirect_pair_return: bool,
}

/// Where one parameter lands. Register indices refer to the
/// convention's argument-register order; stack offsets are bytes from
/// the first stack-argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    IntReg(u8),
    /// Two adjacent integer registers, low half first.
    IntRegPair(u8),
    FloatReg(u8),
    Stack(u32),
    /// Two adjacent stack slots, low half first.
    StackPair(u32),
}

/// Complete assignment for a signature under one register file.
#[derive(Debug)]
pub struct CallPlan {
    pub placements: Vec<(TypeKind, Placement)>,
    /// Bytes of spilled arguments, before call-site alignment padding.
    pub stack_bytes: u32,
    /// The return slot must be preloaded into the first integer
    /// register; no post-call store is emitted.
    pub indirect_return: bool,
}

pub fn plan(sig: &Signature, file: &RegisterFile) -> Result<CallPlan, FfiError> {
    let mut int_used: u8 = 0;
    let mut float_used: u8 = 0;
    let mut stack_bytes: u32 = 0;

    let indirect_return = file.indirect_pair_return
        && matches!(sig.return_kind(), TypeKind::I128 | TypeKind::U128);
    if indirect_return {
        int_used = 1;
        if file.positional {
            float_used = 1;
        }
    }

    let mut placements = Vec::with_capacity(sig.param_count());
    for &kind in sig.params() {
        // Signature construction already rejects void parameters; a
        // classless kind reaching here is still refused, not encoded.
        let class = kind.class().ok_or(FfiError::UnsupportedType(kind))?;
        let placement = match class {
            AbiClass::Integer => {
                if int_used < file.int_regs {
                    let reg = int_used;
                    int_used += 1;
                    if file.positional {
                        float_used += 1;
                    }
                    Placement::IntReg(reg)
                } else {
                    let offset = stack_bytes;
                    stack_bytes += 8;
                    Placement::Stack(offset)
                }
            }
            AbiClass::Float => {
                if float_used < file.float_regs {
                    let reg = float_used;
                    float_used += 1;
                    if file.positional {
                        int_used += 1;
                    }
                    Placement::FloatReg(reg)
                } else {
                    let offset = stack_bytes;
                    stack_bytes += 8;
                    Placement::Stack(offset)
                }
            }
            AbiClass::IntegerPair => {
                if int_used + 1 < file.int_regs {
                    let reg = int_used;
                    int_used += 2;
                    if file.positional {
                        float_used += 2;
                    }
                    Placement::IntRegPair(reg)
                } else {
                    // One register may remain; it stays unused. Later
                    // integer arguments keep spilling rather than
                    // backfilling past this one.
                    int_used = file.int_regs;
                    if file.positional {
                        float_used = file.float_regs;
                    }
                    let offset = stack_bytes;
                    stack_bytes += 16;
                    Placement::StackPair(offset)
                }
            }
        };
        placements.push((kind, placement));
    }

    Ok(CallPlan {
        placements,
        stack_bytes,
        indirect_return,
    })
}

/// Rounds a stack reservation up to the 16-byte call-site alignment
/// every supported convention requires.
pub fn align_reservation(bytes: u32) -> u32 {
    (bytes + 15) & !15
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    const SYSV: RegisterFile = RegisterFile {
        int_regs: 6,
        float_regs: 8,
        positional: false,
        indirect_pair_return: false,
    };
    const WIN64: RegisterFile = RegisterFile {
        int_regs: 4,
        float_regs: 4,
        positional: true,
        indirect_pair_return: true,
    };

    fn sig(ret: TypeKind, params: Vec<TypeKind>) -> Signature {
        Signature::new("t", ret, params, ptr::null()).unwrap()
    }

    #[test]
    fn seventh_integer_spills_on_sysv() {
        let plan = plan(&sig(TypeKind::I32, vec![TypeKind::I32; 8]), &SYSV).unwrap();
        assert_eq!(plan.placements[5].1, Placement::IntReg(5));
        assert_eq!(plan.placements[6].1, Placement::Stack(0));
        assert_eq!(plan.placements[7].1, Placement::Stack(8));
        assert_eq!(plan.stack_bytes, 16);
    }

    #[test]
    fn ninth_double_spills_on_sysv() {
        let plan = plan(&sig(TypeKind::F64, vec![TypeKind::F64; 9]), &SYSV).unwrap();
        assert_eq!(plan.placements[7].1, Placement::FloatReg(7));
        assert_eq!(plan.placements[8].1, Placement::Stack(0));
    }

    #[test]
    fn sysv_classes_count_independently() {
        let mut params = vec![TypeKind::I64; 6];
        params.extend([TypeKind::F64; 8]);
        params.push(TypeKind::I32);
        params.push(TypeKind::F64);
        let plan = plan(&sig(TypeKind::I32, params), &SYSV).unwrap();
        assert_eq!(plan.placements[13].1, Placement::FloatReg(7));
        assert_eq!(plan.placements[14].1, Placement::Stack(0));
        assert_eq!(plan.placements[15].1, Placement::Stack(8));
    }

    #[test]
    fn win64_positions_are_shared_between_classes() {
        let plan = plan(
            &sig(
                TypeKind::I32,
                vec![TypeKind::I32, TypeKind::F64, TypeKind::I32, TypeKind::F32, TypeKind::I32],
            ),
            &WIN64,
        )
        .unwrap();
        assert_eq!(plan.placements[0].1, Placement::IntReg(0));
        assert_eq!(plan.placements[1].1, Placement::FloatReg(1));
        assert_eq!(plan.placements[2].1, Placement::IntReg(2));
        assert_eq!(plan.placements[3].1, Placement::FloatReg(3));
        assert_eq!(plan.placements[4].1, Placement::Stack(0));
    }

    #[test]
    fn pair_takes_two_adjacent_registers() {
        let plan = plan(
            &sig(TypeKind::Void, vec![TypeKind::I64, TypeKind::I128]),
            &SYSV,
        )
        .unwrap();
        assert_eq!(plan.placements[1].1, Placement::IntRegPair(1));
    }

    #[test]
    fn pair_never_splits_across_register_and_stack() {
        let mut params = vec![TypeKind::I64; 5];
        params.push(TypeKind::I128);
        params.push(TypeKind::I64);
        let plan = plan(&sig(TypeKind::Void, params), &SYSV).unwrap();
        assert_eq!(plan.placements[5].1, Placement::StackPair(0));
        // No backfill into the register the pair skipped.
        assert_eq!(plan.placements[6].1, Placement::Stack(16));
        assert_eq!(plan.stack_bytes, 24);
    }

    #[test]
    fn win64_pair_return_shifts_arguments() {
        let plan = plan(
            &sig(TypeKind::I128, vec![TypeKind::I64, TypeKind::F64]),
            &WIN64,
        )
        .unwrap();
        assert!(plan.indirect_return);
        assert_eq!(plan.placements[0].1, Placement::IntReg(1));
        assert_eq!(plan.placements[1].1, Placement::FloatReg(2));
    }

    #[test]
    fn sysv_pair_return_shifts_nothing() {
        let plan = plan(&sig(TypeKind::I128, vec![TypeKind::I64]), &SYSV).unwrap();
        assert!(!plan.indirect_return);
        assert_eq!(plan.placements[0].1, Placement::IntReg(0));
    }

    #[test]
    fn reservation_alignment() {
        assert_eq!(align_reservation(0), 0);
        assert_eq!(align_reservation(8), 16);
        assert_eq!(align_reservation(16), 16);
        assert_eq!(align_reservation(24), 32);
    }

    #[test]
    fn void_parameter_class_is_refused() {
        let sig = Signature::unchecked("bad", TypeKind::I32, vec![TypeKind::Void], ptr::null());
        match plan(&sig, &SYSV) {
            Err(FfiError::UnsupportedType(TypeKind::Void)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
