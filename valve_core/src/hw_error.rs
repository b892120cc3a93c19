//! Maps `Box<dyn Error>` from trait boundaries to typed `ValveError`.
//!
//! The traits in `valve_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `valve_hardware::HwError`
//! downcasting.

use crate::error::ValveError;

/// Map a trait-boundary error to a typed `ValveError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ValveError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<valve_hardware::error::HwError>() {
            return match hw {
                valve_hardware::error::HwError::RegionBounds { .. } => {
                    ValveError::Store(hw.to_string())
                }
                valve_hardware::error::HwError::Io(_) => ValveError::Store(hw.to_string()),
                other => ValveError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("store") || s.to_lowercase().contains("region") {
        ValveError::Store(s)
    } else {
        ValveError::Hardware(s)
    }
}
