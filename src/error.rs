use crate::types::TypeKind;
use thiserror::Error;

/// Errors surfaced by trampoline construction and invocation.
///
/// Construction-time failures mean no trampoline was published; the
/// partially built mapping is released before the error is returned.
/// Invocation-time failures mean the return slot was never written.
#[derive(Debug, Error)]
pub enum FfiError {
    /// The operating system refused an executable allocation.
    #[error("executable allocation failed")]
    OutOfMemory(#[source] std::io::Error),

    /// The generator has no encoding for this kind on the selected ABI.
    #[error("no encoding for {0:?} on this ABI")]
    UnsupportedType(TypeKind),

    /// A signature was built with `Void` in parameter position.
    #[error("parameter {index} is void")]
    VoidParameter { index: usize },

    /// The argument vector length does not match the signature.
    #[error("expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    /// A non-void signature was invoked without a return slot.
    #[error("return slot required for non-void return type")]
    MissingReturnSlot,

    /// An encoding limit was exceeded: more bytes than the reserved
    /// region holds, or an offset past an instruction's immediate
    /// range.
    #[error("encoding needs {written} where at most {capacity} is representable")]
    EncodingOverflow { written: usize, capacity: usize },

    /// The host is not one of the supported architecture/OS pairs.
    #[error("no trampoline generator for the host platform")]
    UnsupportedHost,
}
