/// Function signatures and the type-erased call-time value containers
///
/// A `Signature` is the immutable description the generators consume: a
/// debug name, return kind, parameter kinds in declaration order, and the
/// address of the native function to call. `Arg` and `ReturnBuffer` are
/// the two containers that cross the trampoline boundary at call time.
use crate::error::FfiError;
use crate::types::TypeKind;
use std::ffi::c_void;

/// Immutable description of a native callee.
#[derive(Debug, Clone)]
pub struct Signature {
    name: String,
    ret: TypeKind,
    params: Vec<TypeKind>,
    target: *const c_void,
}

impl Signature {
    /// Builds a signature, rejecting `Void` in parameter position.
    ///
    /// The target address is stored verbatim; it is embedded as an
    /// absolute 64-bit immediate in the generated code.
    pub fn new(
        name: impl Into<String>,
        ret: TypeKind,
        params: Vec<TypeKind>,
        target: *const c_void,
    ) -> Result<Signature, FfiError> {
        if let Some(index) = params.iter().position(|kind| *kind == TypeKind::Void) {
            return Err(FfiError::VoidParameter { index });
        }
        Ok(Signature {
            name: name.into(),
            ret,
            params,
            target,
        })
    }

    /// Builds a signature without parameter validation, so tests can
    /// drive the generators' own refusal paths.
    #[cfg(test)]
    pub(crate) fn unchecked(
        name: impl Into<String>,
        ret: TypeKind,
        params: Vec<TypeKind>,
        target: *const c_void,
    ) -> Signature {
        Signature {
            name: name.into(),
            ret,
            params,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_kind(&self) -> TypeKind {
        self.ret
    }

    pub fn params(&self) -> &[TypeKind] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn target(&self) -> *const c_void {
        self.target
    }
}

// The target pointer is code, not shared data; signatures move freely
// between threads.
unsafe impl Send for Signature {}
unsafe impl Sync for Signature {}

/// One slot of the type-erased argument vector.
///
/// Holds a borrowed pointer to caller-owned storage of the parameter's
/// kind. The layout is fixed at one pointer per slot so generated code
/// can index the vector as `base + i * 8`.
///
/// The pointee must be at least as aligned as the kind's natural
/// alignment and must outlive the invocation; `Arg` never owns it.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Arg {
    value: *const c_void,
}

impl Arg {
    /// Borrows `value` as an argument slot.
    pub fn new<T>(value: &T) -> Arg {
        Arg {
            value: value as *const T as *const c_void,
        }
    }

    /// Wraps a raw pointer the caller vouches for.
    pub fn from_ptr(value: *const c_void) -> Arg {
        Arg { value }
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.value
    }
}

/// Call-side buffer for a native return value.
///
/// Sized and aligned for the widest supported scalar (a 128-bit integer)
/// so a single buffer serves every return kind. The accessor used after
/// an invocation must match the signature's return kind; reading through
/// a mismatched accessor yields whatever bytes the store left behind.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(16))]
pub struct ReturnBuffer {
    bytes: [u8; 16],
}

impl ReturnBuffer {
    pub fn new() -> ReturnBuffer {
        ReturnBuffer { bytes: [0; 16] }
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.bytes.as_mut_ptr() as *mut c_void
    }

    pub fn as_bool(&self) -> bool {
        self.bytes[0] != 0
    }

    pub fn as_i8(&self) -> i8 {
        self.bytes[0] as i8
    }

    pub fn as_u8(&self) -> u8 {
        self.bytes[0]
    }

    pub fn as_i16(&self) -> i16 {
        i16::from_ne_bytes(self.bytes[..2].try_into().unwrap())
    }

    pub fn as_u16(&self) -> u16 {
        u16::from_ne_bytes(self.bytes[..2].try_into().unwrap())
    }

    pub fn as_i32(&self) -> i32 {
        i32::from_ne_bytes(self.bytes[..4].try_into().unwrap())
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_ne_bytes(self.bytes[..4].try_into().unwrap())
    }

    pub fn as_i64(&self) -> i64 {
        i64::from_ne_bytes(self.bytes[..8].try_into().unwrap())
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_ne_bytes(self.bytes[..8].try_into().unwrap())
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_ne_bytes(self.bytes[..4].try_into().unwrap())
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_ne_bytes(self.bytes[..8].try_into().unwrap())
    }

    pub fn as_i128(&self) -> i128 {
        i128::from_ne_bytes(self.bytes)
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_ne_bytes(self.bytes)
    }

    pub fn as_raw_ptr(&self) -> *const c_void {
        usize::from_ne_bytes(self.bytes[..8].try_into().unwrap()) as *const c_void
    }
}

impl Default for ReturnBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn signature_rejects_void_parameters() {
        let err = Signature::new(
            "bad",
            TypeKind::I32,
            vec![TypeKind::I32, TypeKind::Void],
            ptr::null(),
        )
        .unwrap_err();
        match err {
            FfiError::VoidParameter { index } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn signature_allows_void_return() {
        let sig = Signature::new("f", TypeKind::Void, vec![TypeKind::F64], ptr::null()).unwrap();
        assert_eq!(sig.return_kind(), TypeKind::Void);
        assert_eq!(sig.param_count(), 1);
    }

    #[test]
    fn arg_slots_are_pointer_sized() {
        assert_eq!(std::mem::size_of::<Arg>(), 8);
        let value = 7_i64;
        let arg = Arg::new(&value);
        assert_eq!(arg.as_ptr() as usize, &value as *const i64 as usize);
    }

    #[test]
    fn return_buffer_round_trips_scalars() {
        let mut buffer = ReturnBuffer::new();
        let bytes = 0x1234_5678_9abc_def0_u64.to_ne_bytes();
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.as_mut_ptr() as *mut u8, 8);
        }
        assert_eq!(buffer.as_u64(), 0x1234_5678_9abc_def0);
        assert_eq!(buffer.as_u32(), 0x9abc_def0);
    }

    #[test]
    fn return_buffer_is_sixteen_aligned() {
        assert_eq!(std::mem::align_of::<ReturnBuffer>(), 16);
        assert_eq!(std::mem::size_of::<ReturnBuffer>(), 16);
    }
}
