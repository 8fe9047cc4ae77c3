/// Trampoline code generation - architecture-agnostic interface
///
/// Three calling conventions share one skeleton: move the entry
/// registers to callee-saved homes, reserve aligned stack for spills,
/// load each argument's pointee with a type-directed instruction, call
/// the target through a scratch register, store the return value. The
/// per-convention differences live in the register files consumed by
/// `plan` and in the per-architecture encoders.
///
/// ## Module Structure
/// - `api`: convention enum and host selection
/// - `backend`: the generator trait
/// - `plan`: register and stack-slot assignment
/// - `sizing`: worst-case size bound for region allocation
/// - `x86_64`: encoder plus System V and Win64 generators
/// - `aarch64`: encoder plus AAPCS64 generator
pub mod aarch64;
pub mod api;
pub mod backend;
pub mod plan;
pub mod sizing;
pub mod x86_64;

pub use api::Abi;
pub use backend::AbiEmitter;
