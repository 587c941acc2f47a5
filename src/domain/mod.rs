pub mod prediction;

pub use prediction::*;

/// Daily windows (inclusive hours) in which shedding risk is weighted higher
pub const PEAK_WINDOWS: [(u32, u32); 2] = [(6, 10), (17, 21)];

/// Whether `hour` falls in a morning or evening peak window
pub fn is_peak_hour(hour: u32) -> bool {
    PEAK_WINDOWS
        .iter()
        .any(|&(start, end)| (start..=end).contains(&hour))
}
