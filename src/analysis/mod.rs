pub mod align;
pub mod pixel_diff;
pub mod regions;

/// Rounds to two decimal places, the precision used in reports.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
