/// Invocation gateway
///
/// Validates a type-erased argument vector against a trampoline's
/// signature and transfers control to the generated code. Validation
/// covers only what the dispatcher can see: the argument count and the
/// presence of a return slot. Argument pointees are opaque here; their
/// types, alignment and lifetimes are the caller's contract.
use crate::error::FfiError;
use crate::signature::Arg;
use crate::trampoline::Trampoline;
use crate::types::TypeKind;
use log::{trace, warn};
use std::ffi::c_void;

pub struct Dispatcher;

impl Dispatcher {
    /// Runs `trampoline` over `args`, writing the native return value
    /// through `ret` (null for void returns).
    ///
    /// Returns without touching `ret` on validation failure. Blocks
    /// until the native call returns; there is no cancellation.
    ///
    /// # Safety
    ///
    /// Each `args[i]` must point to live, sufficiently aligned storage
    /// of the signature's i-th parameter kind, `ret` must point to at
    /// least `return_kind().width()` writable bytes when non-null, and
    /// the signature's target must be a function actually matching the
    /// described shape.
    pub unsafe fn invoke(
        trampoline: &Trampoline,
        args: &[Arg],
        ret: *mut c_void,
    ) -> Result<(), FfiError> {
        let signature = trampoline.signature();
        if args.len() != signature.param_count() {
            warn!(
                "'{}' invoked with {} arguments, expected {}",
                signature.name(),
                args.len(),
                signature.param_count()
            );
            return Err(FfiError::ArityMismatch {
                expected: signature.param_count(),
                got: args.len(),
            });
        }
        if ret.is_null() && signature.return_kind() != TypeKind::Void {
            warn!("'{}' returns {:?} but no return slot was supplied",
                signature.name(),
                signature.return_kind()
            );
            return Err(FfiError::MissingReturnSlot);
        }

        trace!("dispatching '{}' with {} arguments", signature.name(), args.len());
        (trampoline.invoker())(args.as_ptr(), args.len(), ret);
        Ok(())
    }
}
