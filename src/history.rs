use crate::cache::{Clock, SystemClock};
use crate::error::{AppError, Result};
use crate::models::{display_timestamp, SensorData, SensorUpdate};
use chrono::Duration;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Nominal window: one sample per hour over a day
pub const DEFAULT_CAPACITY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Advance time: drop the oldest sample and append the merged one. Right
    /// after seeding this degrades to an in-place update.
    LiveAppend,
    /// Enrich the current snapshot: replace the tail without dropping.
    InPlace,
}

/// Fixed-capacity, oldest-first sequence of sensor samples.
///
/// Once seeded the history is never empty and the tail is the current
/// sample. Every tail change bumps `revision`.
pub struct SensorHistory {
    samples: VecDeque<SensorData>,
    capacity: usize,
    manual: bool,
    fresh_seed: bool,
    revision: u64,
    clock: Arc<dyn Clock>,
}

impl SensorHistory {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            manual: false,
            fresh_seed: false,
            revision: 0,
            clock,
        }
    }

    /// Seed with a synthetic run if the history is empty
    pub fn seed(&mut self) -> bool {
        self.seed_with(&mut rand::thread_rng())
    }

    /// Seed with `capacity` synthetic hourly samples ending now.
    ///
    /// Moisture 35–55 %, rainfall 0 with a one-in-five chance of a 0–5 mm
    /// event, groundwater 25–27 m, temperature 23–33 °C, humidity 50–70 %.
    pub fn seed_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.samples.is_empty() {
            return false;
        }

        let now = self.clock.now();
        let samples = (0..self.capacity).rev().map(|hours_ago| SensorData {
            timestamp: display_timestamp(now - Duration::hours(hours_ago as i64)),
            soil_moisture: 45.0 + rng.gen_range(-10.0..10.0),
            rainfall: if rng.gen_bool(0.2) {
                rng.gen_range(0.0..5.0)
            } else {
                0.0
            },
            groundwater_level: 25.0 + rng.gen_range(0.0..2.0),
            temperature: 28.0 + rng.gen_range(-5.0..5.0),
            humidity: 60.0 + rng.gen_range(-10.0..10.0),
        });
        self.samples.extend(samples);
        self.mark_seeded();

        debug!("Seeded sensor history with {} synthetic samples", self.samples.len());
        true
    }

    /// Seed from known samples (oldest first) if the history is empty. Only
    /// the newest `capacity` samples are kept.
    pub fn seed_from<I>(&mut self, samples: I) -> bool
    where
        I: IntoIterator<Item = SensorData>,
    {
        if !self.samples.is_empty() {
            return false;
        }

        self.samples.extend(samples);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        if self.samples.is_empty() {
            return false;
        }
        self.mark_seeded();
        true
    }

    fn mark_seeded(&mut self) {
        self.fresh_seed = true;
        self.revision += 1;
    }

    /// Merge `update` into the tail according to `policy` and return the new
    /// tail.
    pub fn apply_partial(&mut self, update: &SensorUpdate, policy: MergePolicy) -> Result<&SensorData> {
        let timestamp = display_timestamp(self.clock.now());
        let next = self.current_sample()?.merged(update, timestamp);

        let slide = policy == MergePolicy::LiveAppend && !self.fresh_seed;
        if slide {
            if self.samples.len() >= self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(next);
        } else if let Some(tail) = self.samples.back_mut() {
            *tail = next;
        }

        self.fresh_seed = false;
        self.revision += 1;
        self.current_sample()
    }

    /// Enter manual mode and merge `update` into the tail in place
    pub fn override_with(&mut self, update: &SensorUpdate) -> Result<&SensorData> {
        self.current_sample()?;
        self.manual = true;
        self.apply_partial(update, MergePolicy::InPlace)
    }

    /// Return to live mode. Data is left untouched.
    pub fn clear_override(&mut self) {
        self.manual = false;
    }

    pub fn current_sample(&self) -> Result<&SensorData> {
        self.samples.back().ok_or(AppError::EmptyHistory)
    }

    /// Oldest sample still in the window
    pub fn head(&self) -> Option<&SensorData> {
        self.samples.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorData> {
        self.samples.iter()
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn history() -> SensorHistory {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        SensorHistory::with_clock(DEFAULT_CAPACITY, Arc::new(clock))
    }

    fn seeded() -> SensorHistory {
        let mut history = history();
        history.seed_with(&mut StdRng::seed_from_u64(7));
        history
    }

    #[test]
    fn test_seed_shape_and_bounds() {
        for seed in 0..20 {
            let mut history = history();
            assert!(history.seed_with(&mut StdRng::seed_from_u64(seed)));
            assert_eq!(history.len(), DEFAULT_CAPACITY);

            for s in history.iter() {
                assert!((35.0..=55.0).contains(&s.soil_moisture));
                assert!((0.0..=5.0).contains(&s.rainfall));
                assert!((25.0..=27.0).contains(&s.groundwater_level));
                assert!((23.0..=33.0).contains(&s.temperature));
                assert!((50.0..=70.0).contains(&s.humidity));
                assert_eq!(s.timestamp.len(), 5);
            }
        }
    }

    #[test]
    fn test_seed_is_noop_when_populated() {
        let mut history = seeded();
        let before: Vec<SensorData> = history.iter().cloned().collect();
        assert!(!history.seed());
        assert_eq!(history.iter().cloned().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_current_sample_before_seed_fails() {
        let history = history();
        assert!(matches!(history.current_sample(), Err(AppError::EmptyHistory)));

        let mut history = history;
        let result = history.apply_partial(&SensorUpdate::soil_moisture(10.0), MergePolicy::InPlace);
        assert!(matches!(result, Err(AppError::EmptyHistory)));
    }

    #[test]
    fn test_first_live_append_after_seed_updates_in_place() {
        let mut history = seeded();
        let head = history.head().cloned();

        history
            .apply_partial(&SensorUpdate::soil_moisture(33.0), MergePolicy::LiveAppend)
            .unwrap();

        assert_eq!(history.len(), DEFAULT_CAPACITY);
        assert_eq!(history.head().cloned(), head);
        assert_eq!(history.current_sample().unwrap().soil_moisture, 33.0);

        // The window is established now, so the next live append slides
        history
            .apply_partial(&SensorUpdate::soil_moisture(34.0), MergePolicy::LiveAppend)
            .unwrap();
        assert_eq!(history.len(), DEFAULT_CAPACITY);
        assert_ne!(history.head().cloned(), head);
    }

    #[test]
    fn test_sliding_window_keeps_length() {
        let mut history = seeded();
        history
            .apply_partial(&SensorUpdate::default(), MergePolicy::InPlace)
            .unwrap();

        for i in 1..=100 {
            history
                .apply_partial(&SensorUpdate::soil_moisture(i as f64), MergePolicy::LiveAppend)
                .unwrap();
            assert_eq!(history.len(), DEFAULT_CAPACITY);
        }

        assert_eq!(history.current_sample().unwrap().soil_moisture, 100.0);
        assert_eq!(history.head().unwrap().soil_moisture, 76.0);
    }

    #[test]
    fn test_live_appends_straight_after_seed() {
        let mut history = seeded();

        for i in 1..=100 {
            history
                .apply_partial(&SensorUpdate::soil_moisture(i as f64), MergePolicy::LiveAppend)
                .unwrap();
            assert_eq!(history.len(), DEFAULT_CAPACITY);
        }

        // 1 lands on the seeded tail, 2..=100 slide the window
        assert_eq!(history.current_sample().unwrap().soil_moisture, 100.0);
        assert_eq!(history.head().unwrap().soil_moisture, 76.0);
    }

    #[test]
    fn test_in_place_replaces_only_tail() {
        let mut history = seeded();
        history
            .apply_partial(&SensorUpdate::default(), MergePolicy::InPlace)
            .unwrap();
        let before: Vec<SensorData> = history.iter().cloned().collect();

        history
            .apply_partial(
                &SensorUpdate {
                    rainfall: Some(14.0),
                    ..SensorUpdate::default()
                },
                MergePolicy::InPlace,
            )
            .unwrap();
        let after: Vec<SensorData> = history.iter().cloned().collect();

        assert_eq!(after.len(), before.len());
        assert_eq!(after[..after.len() - 1], before[..before.len() - 1]);
        let tail = after.last().unwrap();
        let old_tail = before.last().unwrap();
        assert_eq!(tail.rainfall, 14.0);
        assert_eq!(tail.soil_moisture, old_tail.soil_moisture);
        assert_eq!(tail.humidity, old_tail.humidity);
    }

    #[test]
    fn test_override_and_clear() {
        let mut history = seeded();
        let revision = history.revision();

        history
            .override_with(&SensorUpdate::soil_moisture(12.0))
            .unwrap();
        assert!(history.is_manual());
        assert_eq!(history.len(), DEFAULT_CAPACITY);
        assert_eq!(history.revision(), revision + 1);

        let tail = history.current_sample().unwrap().clone();
        history.clear_override();
        assert!(!history.is_manual());
        assert_eq!(history.current_sample().unwrap(), &tail);
        assert_eq!(history.revision(), revision + 1);
    }

    #[test]
    fn test_timestamp_regenerated_on_merge() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let mut history = SensorHistory::with_clock(3, Arc::new(clock.clone()));
        history.seed_with(&mut StdRng::seed_from_u64(1));

        clock.advance(Duration::minutes(90));
        let tail = history
            .apply_partial(&SensorUpdate::default(), MergePolicy::InPlace)
            .unwrap();
        let expected = display_timestamp(Utc.with_ymd_and_hms(2024, 6, 1, 13, 30, 0).unwrap());
        assert_eq!(tail.timestamp, expected);
    }

    #[test]
    fn test_seed_from_keeps_newest_samples() {
        let mut history = SensorHistory::new(2);
        let samples = (0..4).map(|i| SensorData {
            timestamp: format!("0{}:00", i),
            soil_moisture: i as f64,
            rainfall: 0.0,
            groundwater_level: 20.0,
            temperature: 25.0,
            humidity: 50.0,
        });
        assert!(history.seed_from(samples));
        assert_eq!(history.len(), 2);
        assert_eq!(history.head().unwrap().soil_moisture, 2.0);
        assert_eq!(history.current_sample().unwrap().soil_moisture, 3.0);
    }
}
