use chrono::TimeDelta;

use crate::error::{FailTrackError, Result};

pub const DEFAULT_WINDOW_DAYS: u32 = 5;
pub const DEFAULT_MAX_BATCH: usize = 10;

/// Tuning for the scan trigger.
#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    /// How far back the scan log is consulted.
    pub window: TimeDelta,
    /// Maximum number of builds dispatched per scan.
    pub max_batch: usize,
}

impl ScanSettings {
    pub fn new(window_days: u32, max_batch: usize) -> Result<Self> {
        if window_days == 0 {
            return Err(FailTrackError::Config(
                "window must span at least one day".to_string(),
            ));
        }
        if max_batch == 0 {
            return Err(FailTrackError::Config(
                "max batch must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            window: TimeDelta::days(i64::from(window_days)),
            max_batch,
        })
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            window: TimeDelta::days(i64::from(DEFAULT_WINDOW_DAYS)),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ScanSettings::default();

        assert_eq!(settings.window, TimeDelta::days(5));
        assert_eq!(settings.max_batch, 10);
    }

    #[test]
    fn test_new_rejects_zero_values() {
        assert!(matches!(
            ScanSettings::new(0, 10),
            Err(FailTrackError::Config(_))
        ));
        assert!(matches!(
            ScanSettings::new(5, 0),
            Err(FailTrackError::Config(_))
        ));
    }

    #[test]
    fn test_new_converts_days() {
        let settings = ScanSettings::new(2, 3).unwrap();

        assert_eq!(settings.window, TimeDelta::days(2));
        assert_eq!(settings.max_batch, 3);
    }
}
