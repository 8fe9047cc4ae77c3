/// Calling-convention selection
///
/// `Abi` names the three supported conventions and resolves the host's
/// convention from the compile-time target. The trampoline factory only
/// ever emits for the host; the other emitters stay reachable for
/// cross-checking their output.
use super::aarch64::aapcs::AapcsEmitter;
use super::backend::AbiEmitter;
use super::x86_64::sysv::SysVEmitter;
use super::x86_64::win64::Win64Emitter;

/// Supported calling conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    /// System V AMD64 (linux and macOS on x86-64).
    SysV,
    /// Microsoft x64.
    Win64,
    /// AAPCS64 (aarch64).
    Aapcs64,
}

impl Abi {
    /// Convention of the compilation target, if it is one we can emit
    /// for.
    pub fn host() -> Option<Abi> {
        if cfg!(all(target_arch = "x86_64", windows)) {
            Some(Abi::Win64)
        } else if cfg!(target_arch = "x86_64") {
            Some(Abi::SysV)
        } else if cfg!(target_arch = "aarch64") {
            Some(Abi::Aapcs64)
        } else {
            None
        }
    }

    pub fn emitter(self) -> &'static dyn AbiEmitter {
        match self {
            Abi::SysV => &SysVEmitter,
            Abi::Win64 => &Win64Emitter,
            Abi::Aapcs64 => &AapcsEmitter,
        }
    }
}
