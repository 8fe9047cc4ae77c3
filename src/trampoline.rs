/// Trampoline construction and ownership
///
/// A `Trampoline` pairs a signature with the published machine code
/// that marshals for it. Construction allocates a writable region sized
/// from the signature, emits through the host's generator, and
/// publishes the region read/execute; failure at any step releases the
/// region and returns the error with nothing published.
use crate::codegen::{sizing, Abi};
use crate::error::FfiError;
use crate::memory::{CodeBuffer, CodePages};
use crate::signature::{Arg, Signature};
use log::{debug, trace};
use std::ffi::c_void;
use std::fmt::Write as _;

/// Entry contract of every generated trampoline: argument vector base,
/// argument count, return slot (null for void returns).
pub type RawInvoker = unsafe extern "C" fn(*const Arg, usize, *mut c_void);

pub struct Trampoline {
    signature: Signature,
    pages: CodePages,
    invoker: RawInvoker,
}

impl Trampoline {
    /// Builds and publishes a trampoline for the host ABI.
    pub fn new(signature: Signature) -> Result<Trampoline, FfiError> {
        let abi = Abi::host().ok_or(FfiError::UnsupportedHost)?;
        let mut buffer = CodeBuffer::allocate(sizing::worst_case(&signature))?;
        let code = abi.emitter().emit(&signature)?;
        buffer.write(&code)?;
        let pages = buffer.publish(code.len())?;

        debug!(
            "built {} trampoline for '{}': {} bytes at {:p}",
            abi.emitter().name(),
            signature.name(),
            pages.code_len(),
            pages.entry()
        );
        if log::log_enabled!(log::Level::Trace) {
            trace!("trampoline bytes for '{}':\n{}", signature.name(), hex_dump(pages.code()));
        }

        // The entry point only becomes a callable value once the pages
        // are executable.
        let invoker: RawInvoker = unsafe { std::mem::transmute(pages.entry()) };
        Ok(Trampoline {
            signature,
            pages,
            invoker,
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn code_len(&self) -> usize {
        self.pages.code_len()
    }

    pub(crate) fn invoker(&self) -> RawInvoker {
        self.invoker
    }
}

// The published page is immutable and the embedded target pointer is
// code; nothing in a trampoline is mutated after construction.
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

fn hex_dump(code: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in code.chunks(16).enumerate() {
        let _ = write!(out, "{:04x}: ", row * 16);
        for byte in chunk {
            let _ = write!(out, "{byte:02x} ");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;
    use std::ptr;

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn construction_publishes_executable_code() {
        extern "C" fn nop() {}
        let f: extern "C" fn() = nop;
        let sig =
            Signature::new("nop", TypeKind::Void, vec![], f as usize as *const _).unwrap();
        let tramp = Trampoline::new(sig).unwrap();
        assert!(tramp.code_len() > 0);
        assert_eq!(tramp.signature().param_count(), 0);
        unsafe { (tramp.invoker())(ptr::null(), 0, ptr::null_mut()) };
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn every_scalar_signature_constructs() {
        extern "C" fn nop() {}
        let f: extern "C" fn() = nop;
        let kinds = [
            TypeKind::Bool,
            TypeKind::I8,
            TypeKind::U8,
            TypeKind::I16,
            TypeKind::U16,
            TypeKind::I32,
            TypeKind::U32,
            TypeKind::I64,
            TypeKind::U64,
            TypeKind::F32,
            TypeKind::F64,
            TypeKind::Pointer,
            TypeKind::WChar,
            TypeKind::Size,
            TypeKind::I128,
            TypeKind::U128,
        ];
        for ret in kinds.iter().copied().chain([TypeKind::Void]) {
            for param in kinds {
                let sig = Signature::new(
                    "probe",
                    ret,
                    vec![param, param],
                    f as usize as *const _,
                )
                .unwrap();
                // Construction must succeed for the full scalar matrix;
                // the trampolines are not invoked here.
                Trampoline::new(sig).unwrap();
            }
        }
    }

    #[test]
    fn hex_dump_formats_rows_of_sixteen() {
        let dump = hex_dump(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(dump, "0000: de ad be ef \n");
    }
}
