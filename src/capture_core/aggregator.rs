//! Segment aggregator - folds raw pointer samples into movement segments
//!
//! The aggregator is a plain state machine with no locking or I/O. It returns the
//! records it emits and leaves delivery to the caller (see `runtime::CaptureHandle`,
//! which owns the single mutex guarding an instance).
//!
//! A segment starts on the first sample after idle, grows with every following sample,
//! and ends when either:
//! - an idle check finds no sample for at least the inactivity threshold (end = last sample time)
//! - an action event arrives (end = action time)

use super::types::{
    seconds_between, ActionEvent, CaptureRecord, Displacement, MovementSegment, Timestamp,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SegmentAggregator {
    inactivity_threshold_secs: f64,
    active: bool,
    displacement: Displacement,
    last_x: f64,
    last_y: f64,
    last_t: Option<Timestamp>,
    samples: u32,
}

impl SegmentAggregator {
    pub fn new(inactivity_threshold: Duration) -> Self {
        Self {
            inactivity_threshold_secs: inactivity_threshold.as_secs_f64(),
            active: false,
            displacement: Displacement::default(),
            last_x: 0.0,
            last_y: 0.0,
            last_t: None,
            samples: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Displacement accumulated so far in the open segment
    pub fn current_displacement(&self) -> Displacement {
        self.displacement
    }

    pub fn last_sample_time(&self) -> Option<Timestamp> {
        self.last_t
    }

    /// Fold one position sample into the current segment
    ///
    /// Non-finite coordinates are discarded. The first sample of a segment only
    /// anchors the position; displacement starts with the second.
    pub fn on_sample(&mut self, x: f64, y: f64, t: Timestamp) {
        if !x.is_finite() || !y.is_finite() {
            log::warn!("⚠️  Discarding non-finite sample ({}, {}) at {}", x, y, t);
            return;
        }

        if !self.active {
            self.reset();
            self.active = true;
            self.last_x = x;
            self.last_y = y;
            self.last_t = Some(t);
            self.samples = 1;
            log::trace!("Segment started at ({}, {})", x, y);
            return;
        }

        self.displacement.accumulate(x - self.last_x, y - self.last_y);
        self.last_x = x;
        self.last_y = y;
        // Sources deliver non-decreasing timestamps; never move last_t backwards
        self.last_t = Some(match self.last_t {
            Some(prev) if prev > t => prev,
            _ => t,
        });
        self.samples = self.samples.saturating_add(1);
    }

    /// Record an action and close any open segment at the action's timestamp
    ///
    /// Returns the action first, followed by the closed segment if one was open.
    pub fn on_action(&mut self, action: ActionEvent) -> Vec<CaptureRecord> {
        let end = action.timestamp;
        let mut emitted = vec![CaptureRecord::Action(action)];
        if self.active {
            emitted.push(CaptureRecord::Movement(self.finalize(end)));
        }
        emitted
    }

    /// Close the open segment if it has been idle for at least the threshold
    pub fn on_idle_check(&mut self, now: Timestamp) -> Option<MovementSegment> {
        let last_t = self.last_t?;
        if !self.active || seconds_between(now, last_t) < self.inactivity_threshold_secs {
            return None;
        }
        Some(self.finalize(last_t))
    }

    /// Close the open segment unconditionally (shutdown path)
    pub fn finalize_now(&mut self) -> Option<MovementSegment> {
        if !self.active {
            return None;
        }
        let end = self.last_t?;
        Some(self.finalize(end))
    }

    fn finalize(&mut self, end_timestamp: Timestamp) -> MovementSegment {
        let segment = MovementSegment {
            end_timestamp,
            displacement: self.displacement,
            samples: self.samples,
        };
        log::debug!(
            "Segment closed at {}: R={:.1} L={:.1} U={:.1} D={:.1} ({} samples)",
            end_timestamp,
            segment.displacement.right,
            segment.displacement.left,
            segment.displacement.up,
            segment.displacement.down,
            segment.samples
        );
        self.reset();
        segment
    }

    fn reset(&mut self) {
        self.active = false;
        self.displacement = Displacement::default();
        self.last_t = None;
        self.samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_core::types::{timestamp_from_secs, ActionPhase};
    use rand::{Rng, SeedableRng};

    fn ts(secs: f64) -> Timestamp {
        timestamp_from_secs(1_700_000_000.0 + secs).unwrap()
    }

    fn aggregator() -> SegmentAggregator {
        SegmentAggregator::new(Duration::from_secs(1))
    }

    fn press(at: f64) -> ActionEvent {
        ActionEvent {
            timestamp: ts(at),
            button: "left".to_string(),
            phase: ActionPhase::Press,
            x: 0.0,
            y: 0.0,
        }
    }

    #[test]
    fn test_first_sample_only_anchors() {
        let mut agg = aggregator();
        agg.on_sample(100.0, 100.0, ts(0.0));

        assert!(agg.is_active());
        assert!(agg.current_displacement().is_zero());
    }

    #[test]
    fn test_idle_check_closes_at_last_sample_time() {
        let mut agg = aggregator();
        agg.on_sample(0.0, 0.0, ts(0.0));
        agg.on_sample(10.0, -5.0, ts(0.1));
        agg.on_sample(4.0, 1.0, ts(0.2));

        // Not idle long enough yet
        assert!(agg.on_idle_check(ts(0.7)).is_none());
        assert!(agg.is_active());

        let segment = agg.on_idle_check(ts(1.5)).expect("segment should close");
        assert_eq!(segment.end_timestamp, ts(0.2));
        assert_eq!(segment.displacement.right, 10.0);
        assert_eq!(segment.displacement.left, 6.0);
        assert_eq!(segment.displacement.up, 5.0);
        assert_eq!(segment.displacement.down, 6.0);
        assert_eq!(segment.samples, 3);
        assert!(!agg.is_active());

        // Closed segments are not emitted twice
        assert!(agg.on_idle_check(ts(5.0)).is_none());
    }

    #[test]
    fn test_idle_threshold_is_inclusive() {
        let mut agg = aggregator();
        agg.on_sample(0.0, 0.0, ts(0.0));
        agg.on_sample(1.0, 0.0, ts(0.5));

        assert!(agg.on_idle_check(ts(1.5)).is_some());
    }

    #[test]
    fn test_action_closes_segment_at_action_time() {
        let mut agg = aggregator();
        agg.on_sample(0.0, 0.0, ts(0.0));
        agg.on_sample(3.0, 4.0, ts(0.1));

        let emitted = agg.on_action(press(0.3));
        assert_eq!(emitted.len(), 2);
        assert!(matches!(emitted[0], CaptureRecord::Action(_)));
        match &emitted[1] {
            CaptureRecord::Movement(segment) => {
                assert_eq!(segment.end_timestamp, ts(0.3));
                assert_eq!(segment.displacement.right, 3.0);
                assert_eq!(segment.displacement.down, 4.0);
            }
            other => panic!("expected movement, got {:?}", other),
        }
        assert!(!agg.is_active());
    }

    #[test]
    fn test_action_without_segment_only_emits_action() {
        let mut agg = aggregator();
        let emitted = agg.on_action(press(0.0));
        assert_eq!(emitted.len(), 1);
        assert!(matches!(emitted[0], CaptureRecord::Action(_)));
    }

    #[test]
    fn test_single_sample_segment_still_emitted() {
        let mut agg = aggregator();
        agg.on_sample(50.0, 50.0, ts(0.0));

        let segment = agg.on_idle_check(ts(2.0)).unwrap();
        assert!(segment.displacement.is_zero());
        assert_eq!(segment.samples, 1);
    }

    #[test]
    fn test_accumulators_reset_between_segments() {
        let mut agg = aggregator();
        agg.on_sample(0.0, 0.0, ts(0.0));
        agg.on_sample(10.0, 0.0, ts(0.1));
        agg.on_idle_check(ts(2.0)).unwrap();

        agg.on_sample(500.0, 500.0, ts(3.0));
        agg.on_sample(498.0, 500.0, ts(3.1));
        let segment = agg.finalize_now().unwrap();

        assert_eq!(segment.displacement.right, 0.0);
        assert_eq!(segment.displacement.left, 2.0);
        assert_eq!(segment.end_timestamp, ts(3.1));
    }

    #[test]
    fn test_non_finite_samples_discarded() {
        let mut agg = aggregator();
        agg.on_sample(0.0, 0.0, ts(0.0));
        agg.on_sample(f64::NAN, 10.0, ts(0.1));
        agg.on_sample(5.0, 0.0, ts(0.2));

        let segment = agg.finalize_now().unwrap();
        assert_eq!(segment.displacement.right, 5.0);
        assert_eq!(segment.samples, 2);
    }

    #[test]
    fn test_random_walk_matches_partitioned_sums() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let mut agg = aggregator();
            let (mut x, mut y) = (0.0_f64, 0.0_f64);
            let (mut right, mut left, mut up, mut down) = (0.0, 0.0, 0.0, 0.0);
            agg.on_sample(x, y, ts(0.0));

            let steps = rng.gen_range(1..200);
            for i in 1..=steps {
                let dx: f64 = rng.gen_range(-20.0..20.0);
                let dy: f64 = rng.gen_range(-20.0..20.0);
                if dx > 0.0 { right += dx } else { left += -dx }
                if dy < 0.0 { up += -dy } else { down += dy }
                x += dx;
                y += dy;
                // Keep every gap under the inactivity threshold
                agg.on_sample(x, y, ts(i as f64 * 0.01));
                assert!(agg.on_idle_check(ts(i as f64 * 0.01 + 0.5)).is_none());
            }

            let segment = agg.on_action(press(steps as f64 * 0.01 + 0.1))
                .into_iter()
                .find_map(|r| match r {
                    CaptureRecord::Movement(s) => Some(s),
                    _ => None,
                })
                .expect("exactly one segment");

            let d = segment.displacement;
            assert!(d.right >= 0.0 && d.left >= 0.0 && d.up >= 0.0 && d.down >= 0.0);
            // Reconstructed steps differ from the drawn ones by float rounding only
            assert!((d.right - right).abs() < 1e-6);
            assert!((d.left - left).abs() < 1e-6);
            assert!((d.up - up).abs() < 1e-6);
            assert!((d.down - down).abs() < 1e-6);
        }
    }
}
