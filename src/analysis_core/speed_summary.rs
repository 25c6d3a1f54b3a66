//! Mean and variance of recent euclidean speeds

use crate::store::{SqliteStore, StoreError};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSummary {
    pub samples: usize,
    pub mean: f64,
    /// Population variance
    pub variance: f64,
}

impl SpeedSummary {
    /// `None` when there is nothing to summarize
    pub fn from_velocities(velocities: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = velocities.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }

        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            samples: finite.len(),
            mean,
            variance,
        })
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Summary over the newest `window` analysis rows
pub fn summarize_recent(store: &SqliteStore, window: usize) -> Result<Option<SpeedSummary>, StoreError> {
    let velocities = store.recent_euclidean_velocities(window)?;
    Ok(SpeedSummary::from_velocities(&velocities))
}

/// Log a speed summary every `interval` until shutdown
pub async fn run_speed_monitor(
    store: SqliteStore,
    window: usize,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        match summarize_recent(&store, window) {
            Ok(Some(summary)) => log::info!(
                "📈 Speed over last {} movements: mean {:.2} px/s, variance {:.2}",
                summary.samples,
                summary.mean,
                summary.variance
            ),
            Ok(None) => log::debug!("No analyzed movements yet"),
            Err(e) => log::warn!("⚠️  Speed summary unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_population_variance() {
        let summary = SpeedSummary::from_velocities(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();

        assert_eq!(summary.samples, 8);
        assert_eq!(summary.mean, 5.0);
        assert_eq!(summary.variance, 4.0);
        assert_eq!(summary.std_dev(), 2.0);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(SpeedSummary::from_velocities(&[]), None);
        assert_eq!(SpeedSummary::from_velocities(&[f64::NAN]), None);
    }

    #[test]
    fn test_single_value_has_zero_variance() {
        let summary = SpeedSummary::from_velocities(&[3.5]).unwrap();
        assert_eq!(summary.mean, 3.5);
        assert_eq!(summary.variance, 0.0);
    }
}
