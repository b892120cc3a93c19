//! Current-sense classification.
//!
//! The drive motor has no position feedback; the only observable is the
//! current-sense channel. A sample is classified against a quiescent
//! benchmark captured while the outputs were de-energized; anything
//! outside a 20% band around the benchmark means the motor is drawing
//! current, i.e. actively driving the valve.

/// True iff `sample` falls at or outside the ±20% brackets around
/// `benchmark`.
///
/// Tolerance is `benchmark / 5` with integer division; the truncation is
/// deliberate, not a rounding bug. The benchmark must be re-sampled at the
/// start of each phase that uses this: absolute sensor levels drift.
#[inline]
pub fn is_actively_driven(sample: i32, benchmark: i32) -> bool {
    let tolerance = benchmark / 5;
    sample >= benchmark + tolerance || sample <= benchmark - tolerance
}
