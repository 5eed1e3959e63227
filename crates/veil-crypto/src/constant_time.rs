//! Constant-time comparisons.
//!
//! Execution time never depends on the compared values.

use subtle::ConstantTimeEq;

/// Constant-time comparison of two 32-bit values.
#[must_use]
#[inline(never)]
pub fn ct_eq_u32(a: u32, b: u32) -> bool {
    a.ct_eq(&b).into()
}
