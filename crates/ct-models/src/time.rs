//! Tick arithmetic.
//!
//! The recognizer reports every offset and duration in 100-nanosecond ticks.
//! All alignment math stays in integer ticks; conversion to [`Duration`]
//! happens only when captions are built.

use std::time::Duration;

/// A count of 100-nanosecond units.
pub type Ticks = i64;

pub const TICKS_PER_MILLISECOND: Ticks = 10_000;
pub const TICKS_PER_SECOND: Ticks = 10_000_000;

const NANOS_PER_TICK: u128 = 100;

/// Convert ticks to a duration. Negative values clamp to zero.
pub fn ticks_to_duration(ticks: Ticks) -> Duration {
    if ticks <= 0 {
        return Duration::ZERO;
    }
    let ticks = ticks as u64;
    Duration::new(
        ticks / TICKS_PER_SECOND as u64,
        ((ticks % TICKS_PER_SECOND as u64) * NANOS_PER_TICK as u64) as u32,
    )
}

/// Convert a duration to ticks, saturating at `i64::MAX`.
pub fn duration_to_ticks(duration: Duration) -> Ticks {
    let ticks = duration.as_nanos() / NANOS_PER_TICK;
    Ticks::try_from(ticks).unwrap_or(Ticks::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_duration() {
        assert_eq!(ticks_to_duration(TICKS_PER_SECOND), Duration::from_secs(1));
        assert_eq!(ticks_to_duration(15_000), Duration::from_micros(1_500));
        assert_eq!(ticks_to_duration(-5), Duration::ZERO);
    }

    #[test]
    fn test_duration_to_ticks() {
        assert_eq!(duration_to_ticks(Duration::from_millis(250)), 250 * TICKS_PER_MILLISECOND);
        assert_eq!(duration_to_ticks(Duration::from_nanos(150)), 1);
    }
}
