/// Worst-case trampoline size estimation
///
/// Used to size the executable region before emission. The per-argument
/// bound covers the widest sequence any generator produces for one
/// parameter (value-pointer fetch plus a 128-bit load-and-spill); the
/// fixed part covers prologue, target materialization, call, return
/// store and epilogue on the largest-encoding convention.
use crate::signature::Signature;

/// Floor for the region size regardless of signature.
pub const MIN_REGION: usize = 512;

const FIXED_ENVELOPE: usize = 128;
const PER_ARGUMENT: usize = 40;

/// Upper bound on emitted bytes for `sig` on any supported convention.
pub fn worst_case(sig: &Signature) -> usize {
    MIN_REGION.max(FIXED_ENVELOPE + PER_ARGUMENT * sig.param_count())
}
