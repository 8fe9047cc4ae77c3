//! Runtime trampoline engine for foreign function calls
//!
//! Given a description of a native function's signature and its
//! address, this crate synthesizes machine code at call-setup time that
//! marshals a uniform, type-erased argument vector into the registers
//! and stack slots of the host calling convention, calls the target,
//! and stores its result through a caller-supplied buffer. Three
//! conventions are encoded: System V AMD64, Microsoft x64 and AAPCS64.
//!
//! ```no_run
//! use springboard::{Arg, Dispatcher, ReturnBuffer, Signature, Trampoline, TypeKind};
//!
//! extern "C" fn add(a: i32, b: i32) -> i32 { a + b }
//!
//! let f: extern "C" fn(i32, i32) -> i32 = add;
//! let sig = Signature::new(
//!     "add",
//!     TypeKind::I32,
//!     vec![TypeKind::I32, TypeKind::I32],
//!     f as usize as *const _,
//! )?;
//! let tramp = Trampoline::new(sig)?;
//!
//! let (a, b) = (10, 20);
//! let mut ret = ReturnBuffer::new();
//! unsafe { Dispatcher::invoke(&tramp, &[Arg::new(&a), Arg::new(&b)], ret.as_mut_ptr())? };
//! assert_eq!(ret.as_i32(), 30);
//! # Ok::<(), springboard::FfiError>(())
//! ```

pub mod codegen;
mod dispatch;
mod error;
pub mod memory;
mod signature;
mod trampoline;
mod types;

pub use codegen::{Abi, AbiEmitter};
pub use dispatch::Dispatcher;
pub use error::FfiError;
pub use signature::{Arg, ReturnBuffer, Signature};
pub use trampoline::{RawInvoker, Trampoline};
pub use types::{AbiClass, Extension, TypeKind};
