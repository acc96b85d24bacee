//! Brightness arithmetic between spoken percentages and the bridge scale.

/// Highest brightness the bridge accepts
pub const MAX_BRIGHTNESS: u8 = 254;

/// Step used by shift intents when no percentage was spoken
pub const DEFAULT_SHIFT_PERCENT: f64 = 20.0;

/// Direction of a relative brightness change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Up,
    Down,
}

/// Limit a spoken percentage to 0–100
pub fn clamp_percent(percent: f64) -> f64 {
    percent.clamp(0.0, 100.0)
}

/// Convert a percentage in 0–100 to the bridge's 0–254 scale
///
/// Halves round to the even neighbour (25% → 64, 75% → 190).
pub fn percent_to_bridge_scale(percent: f64) -> u8 {
    let scaled = (percent * f64::from(MAX_BRIGHTNESS) / 100.0).round_ties_even();
    scaled.clamp(0.0, f64::from(MAX_BRIGHTNESS)) as u8
}

/// Brightness after shifting `current` by `percent` of the full range
///
/// The percentage is clamped before conversion and the result is clamped to
/// the bridge range afterwards.
pub fn shifted_brightness(current: u8, percent: f64, shift: Shift) -> u8 {
    let delta = i32::from(percent_to_bridge_scale(clamp_percent(percent)));
    let delta = match shift {
        Shift::Up => delta,
        Shift::Down => -delta,
    };
    (i32::from(current) + delta).clamp(0, i32::from(MAX_BRIGHTNESS)) as u8
}
