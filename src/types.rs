/// Scalar type model shared by the signature layer and the ABI generators
///
/// Every supported kind carries three facts the generators need: which
/// register class it travels in, how wide its in-memory representation is
/// on the current target, and how it is extended when loaded into a
/// full-width register.

/// The closed set of scalar kinds a trampoline can marshal.
///
/// Widths are fixed except for `WChar` (4 bytes on unix targets, 2 on
/// windows). C's platform-width types map onto these via the `c_*`
/// constructors; `TypeKind::c_long()` in particular must be used instead
/// of assuming `I64`, because Win64 keeps `long` at 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
    WChar,
    Size,
    I128,
    U128,
}

/// Register class a kind occupies in every supported calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiClass {
    /// One general-purpose register or one 8-byte stack slot.
    Integer,
    /// One floating-point register or one 8-byte stack slot.
    Float,
    /// Two adjacent general-purpose registers or 16 bytes of stack.
    IntegerPair,
}

/// How a value narrower than a register is widened on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Zero,
    Sign,
}

impl TypeKind {
    /// Register class, or `None` for `Void`.
    pub fn class(self) -> Option<AbiClass> {
        match self {
            TypeKind::Void => None,
            TypeKind::F32 | TypeKind::F64 => Some(AbiClass::Float),
            TypeKind::I128 | TypeKind::U128 => Some(AbiClass::IntegerPair),
            _ => Some(AbiClass::Integer),
        }
    }

    /// Byte width of the in-memory representation on the current target.
    pub fn width(self) -> usize {
        match self {
            TypeKind::Void => 0,
            TypeKind::Bool | TypeKind::I8 | TypeKind::U8 => 1,
            TypeKind::I16 | TypeKind::U16 => 2,
            TypeKind::I32 | TypeKind::U32 | TypeKind::F32 => 4,
            TypeKind::WChar => wchar_width(),
            TypeKind::I64 | TypeKind::U64 | TypeKind::F64 => 8,
            TypeKind::Pointer | TypeKind::Size => 8,
            TypeKind::I128 | TypeKind::U128 => 16,
        }
    }

    /// Natural alignment of the pointee; equals the width for every
    /// supported scalar.
    pub fn align(self) -> usize {
        self.width()
    }

    /// Extension rule applied when the pointee is loaded into a register.
    ///
    /// Only meaningful for integer-class kinds narrower than 8 bytes;
    /// full-width and float kinds report `Zero` (a plain move).
    pub fn extension(self) -> Extension {
        match self {
            TypeKind::I8 | TypeKind::I16 | TypeKind::I32 => Extension::Sign,
            // wchar_t is a signed 32-bit int on unix targets, an
            // unsigned 16-bit unit on windows.
            TypeKind::WChar => {
                if cfg!(windows) {
                    Extension::Zero
                } else {
                    Extension::Sign
                }
            }
            _ => Extension::Zero,
        }
    }

    /// Kind of C `char` (signed on every supported target).
    pub fn c_char() -> TypeKind {
        TypeKind::I8
    }

    /// Kind of C `long` on the current target: 32-bit on windows, 64-bit
    /// elsewhere.
    pub fn c_long() -> TypeKind {
        if cfg!(windows) {
            TypeKind::I32
        } else {
            TypeKind::I64
        }
    }

    /// Kind of C `unsigned long` on the current target.
    pub fn c_ulong() -> TypeKind {
        if cfg!(windows) {
            TypeKind::U32
        } else {
            TypeKind::U64
        }
    }
}

fn wchar_width() -> usize {
    if cfg!(windows) {
        2
    } else {
        4
    }
}
