//! Remaining-time extrapolation.

use std::time::Duration;

/// Linearly project the remaining time of an operation.
///
/// Returns `None` until `progress` exceeds `min_progress`, because the
/// observed rate is too noisy right after start, and once the operation
/// has reached 100%.
pub fn estimate_remaining_secs(elapsed: Duration, progress: f64, min_progress: f64) -> Option<f64> {
    if progress.is_nan() || progress <= min_progress || progress >= 100.0 {
        return None;
    }
    Some(elapsed.as_secs_f64() / progress * (100.0 - progress))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_linearly() {
        let eta = estimate_remaining_secs(Duration::from_secs(10), 37.0, 5.0).unwrap();
        assert!((eta - 17.027).abs() < 0.01, "eta was {eta}");
    }

    #[test]
    fn halfway_takes_as_long_again() {
        let eta = estimate_remaining_secs(Duration::from_secs(40), 50.0, 5.0).unwrap();
        assert!((eta - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn withheld_at_or_below_threshold() {
        assert!(estimate_remaining_secs(Duration::from_secs(3), 5.0, 5.0).is_none());
        assert!(estimate_remaining_secs(Duration::from_secs(3), 0.5, 5.0).is_none());
    }

    #[test]
    fn withheld_when_complete() {
        assert!(estimate_remaining_secs(Duration::from_secs(3), 100.0, 5.0).is_none());
    }

    #[test]
    fn nan_progress_yields_none() {
        assert!(estimate_remaining_secs(Duration::from_secs(3), f64::NAN, 5.0).is_none());
    }
}
