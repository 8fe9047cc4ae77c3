/// Architecture-agnostic trampoline generation interface
///
/// Each supported calling convention implements this trait. The
/// trampoline factory picks the implementation for the host at
/// construction time; tests drive the non-host implementations directly
/// to check their encodings.
use crate::error::FfiError;
use crate::signature::Signature;

/// Generator for one calling convention.
///
/// The emitted code is position-independent apart from the absolute
/// target address embedded in it, and is complete: prologue, argument
/// marshalling, call, return store, epilogue.
pub trait AbiEmitter {
    /// Convention name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Emits the full trampoline for `sig`.
    ///
    /// Fails with `UnsupportedType` for any kind the convention cannot
    /// encode; nothing is partially emitted in that case.
    fn emit(&self, sig: &Signature) -> Result<Vec<u8>, FfiError>;
}
