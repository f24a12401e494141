//! # Loss-rate hysteresis
//!
//! Classifies the link as [`ConnectionQuality::Good`] or
//! [`ConnectionQuality::Poor`] from the last few loss readings. A flip needs
//! every reading in the history to agree:
//!
//! - good → poor when all readings are `>= high_threshold_percent`
//! - poor → good when all readings are `< low_threshold_percent`
//!
//! Readings in `[low, high)` hold whichever state is current.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    #[default]
    Good,
    Poor,
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionQuality::Good => write!(f, "good"),
            ConnectionQuality::Poor => write!(f, "poor"),
        }
    }
}

/// Edge emitted when the classification flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTransition {
    /// good → poor
    Degraded,
    /// poor → good
    Recovered,
}

/// Tuning for [`QualityClassifier`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityConfig {
    /// Number of consecutive readings that must agree (default 3).
    pub history_size: usize,
    /// Loss percentage at or above which a reading counts as bad (default 20).
    pub high_threshold_percent: f64,
    /// Loss percentage below which a reading counts as clean (default 5).
    pub low_threshold_percent: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            history_size: 3,
            high_threshold_percent: 20.0,
            low_threshold_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityClassifier {
    config: QualityConfig,
    history: VecDeque<f64>,
    quality: ConnectionQuality,
}

impl QualityClassifier {
    pub fn new(config: QualityConfig) -> Self {
        let config = QualityConfig {
            history_size: config.history_size.max(1),
            ..config
        };
        QualityClassifier {
            history: VecDeque::with_capacity(config.history_size),
            config,
            quality: ConnectionQuality::Good,
        }
    }

    pub fn quality(&self) -> ConnectionQuality {
        self.quality
    }

    /// Most recent readings, oldest first.
    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Record one loss reading and return the transition it caused, if any.
    pub fn observe(&mut self, loss_rate_percent: f64) -> Option<QualityTransition> {
        if self.history.len() == self.config.history_size {
            self.history.pop_front();
        }
        self.history.push_back(loss_rate_percent);

        if self.history.len() < self.config.history_size {
            return None;
        }

        match self.quality {
            ConnectionQuality::Good
                if self
                    .history
                    .iter()
                    .all(|&r| r >= self.config.high_threshold_percent) =>
            {
                self.quality = ConnectionQuality::Poor;
                Some(QualityTransition::Degraded)
            }
            ConnectionQuality::Poor
                if self
                    .history
                    .iter()
                    .all(|&r| r < self.config.low_threshold_percent) =>
            {
                self.quality = ConnectionQuality::Good;
                Some(QualityTransition::Recovered)
            }
            _ => None,
        }
    }
}

impl Default for QualityClassifier {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(c: &mut QualityClassifier, readings: &[f64]) -> Vec<QualityTransition> {
        readings.iter().filter_map(|&r| c.observe(r)).collect()
    }

    #[test]
    fn starts_good() {
        assert_eq!(QualityClassifier::default().quality(), ConnectionQuality::Good);
    }

    #[test]
    fn three_high_readings_degrade_once() {
        let mut c = QualityClassifier::default();
        assert_eq!(feed(&mut c, &[25.0, 25.0, 25.0]), vec![QualityTransition::Degraded]);
        assert_eq!(c.quality(), ConnectionQuality::Poor);

        // Staying high doesn't re-fire.
        assert!(feed(&mut c, &[30.0, 90.0]).is_empty());
    }

    #[test]
    fn mixed_readings_hold() {
        let mut c = QualityClassifier::default();
        assert!(feed(&mut c, &[25.0, 25.0, 3.0]).is_empty());
        assert_eq!(c.quality(), ConnectionQuality::Good);
    }

    #[test]
    fn no_evaluation_before_history_fills() {
        let mut c = QualityClassifier::default();
        assert!(feed(&mut c, &[99.0, 99.0]).is_empty());
        assert_eq!(c.quality(), ConnectionQuality::Good);
    }

    #[test]
    fn recovers_after_three_clean_readings() {
        let mut c = QualityClassifier::default();
        feed(&mut c, &[25.0, 25.0, 25.0]);
        assert_eq!(feed(&mut c, &[3.0, 3.0, 3.0]), vec![QualityTransition::Recovered]);
        assert_eq!(c.quality(), ConnectionQuality::Good);
    }

    #[test]
    fn dead_zone_is_sticky() {
        let mut c = QualityClassifier::default();
        feed(&mut c, &[25.0, 25.0, 25.0]);
        assert!(feed(&mut c, &[4.0, 4.0, 10.0]).is_empty());
        assert_eq!(c.quality(), ConnectionQuality::Poor);

        // Exactly at the low threshold is not clean.
        assert!(feed(&mut c, &[5.0, 5.0, 5.0]).is_empty());
        assert_eq!(c.quality(), ConnectionQuality::Poor);

        // And from good, dead-zone readings never degrade.
        let mut c = QualityClassifier::default();
        assert!(feed(&mut c, &[19.9, 19.9, 19.9, 10.0]).is_empty());
    }

    #[test]
    fn high_threshold_is_inclusive() {
        let mut c = QualityClassifier::default();
        assert_eq!(feed(&mut c, &[20.0, 20.0, 20.0]), vec![QualityTransition::Degraded]);
    }

    #[test]
    fn history_is_bounded() {
        let mut c = QualityClassifier::default();
        feed(&mut c, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(c.history().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn custom_history_size() {
        let mut c = QualityClassifier::new(QualityConfig {
            history_size: 5,
            ..QualityConfig::default()
        });
        assert!(feed(&mut c, &[50.0; 4]).is_empty());
        assert_eq!(c.observe(50.0), Some(QualityTransition::Degraded));
    }
}
