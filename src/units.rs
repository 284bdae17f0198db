//! Volume helpers. Inside the crate every volume is an `f64` in microliters;
//! conversion to other units only happens at the protocol boundary.

pub use synbio_protocol::VolumeUnit;

/// Decimal places kept when a well volume is read back.
pub const VOLUME_DECIMALS: u32 = 4;

/// Volumes closer than this (uL) are treated as equal during allocation.
pub const VOLUME_EPSILON: f64 = 1e-9;

const RELATIVE_TOLERANCE: f64 = 1e-9;
const ABSOLUTE_TOLERANCE: f64 = 1e-12;

#[inline(always)]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// `numpy.isclose`-style comparison with explicit tolerances.
#[inline(always)]
pub fn is_close(a: f64, b: f64, rtol: f64, atol: f64) -> bool {
    (a - b).abs() <= atol + rtol * a.abs().max(b.abs())
}

#[inline(always)]
pub fn approx_eq(a: f64, b: f64) -> bool {
    is_close(a, b, RELATIVE_TOLERANCE, ABSOLUTE_TOLERANCE)
}
