// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Latch-point and presentation-time prediction.
//!
//! The [`FramePredictor`] keeps smoothed estimates of how long update
//! application and rendering take. Given the current time and the display's
//! vsync cadence it picks the earliest vsync that leaves enough room for both,
//! and places the latch point (the scheduler's wakeup) that far before it.

use crate::config::SchedulerConfig;
use crate::time::{Duration, HostTime};

/// Inputs to a prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PredictionRequest {
    /// Current time.
    pub now: HostTime,
    /// Earliest presentation time the caller accepts. [`HostTime::ZERO`]
    /// means "as soon as possible".
    pub requested_presentation_time: HostTime,
    /// Most recent vsync at or before `now`.
    pub last_vsync_time: HostTime,
    /// Interval between vsyncs.
    pub vsync_interval: Duration,
}

/// A predicted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PredictedTimes {
    /// When updates must be latched. Never earlier than the request's `now`.
    pub latch_point_time: HostTime,
    /// When the frame is expected on screen. Always after the latch point.
    pub presentation_time: HostTime,
}

/// Exponential moving average tracker.
#[derive(Clone, Copy, Debug)]
struct Ema {
    value: f32,
    alpha: f32,
    initialized: bool,
}

impl Ema {
    const fn new(alpha: f32) -> Self {
        Self {
            value: 0.0,
            alpha,
            initialized: false,
        }
    }

    fn update(&mut self, sample: f32) {
        if self.initialized {
            self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        } else {
            self.value = sample;
            self.initialized = true;
        }
    }

    fn get_or(&self, fallback: f32) -> f32 {
        if self.initialized {
            self.value
        } else {
            fallback
        }
    }
}

/// Predicts latch points and presentation times from measured durations.
#[derive(Clone, Debug)]
pub struct FramePredictor {
    render: Ema,
    update: Ema,
    initial_render: Duration,
    initial_update: Duration,
    safety_multiplier: f32,
}

impl FramePredictor {
    /// Creates a predictor seeded from `config`.
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            render: Ema::new(config.ema_alpha),
            update: Ema::new(config.ema_alpha),
            initial_render: config.initial_render_duration,
            initial_update: config.initial_update_duration,
            safety_multiplier: config.safety_multiplier,
        }
    }

    /// Feeds one measured render duration.
    pub fn report_render_duration(&mut self, duration: Duration) {
        self.render.update(duration.0 as f32);
    }

    /// Feeds one measured update duration.
    pub fn report_update_duration(&mut self, duration: Duration) {
        self.update.update(duration.0 as f32);
    }

    /// Time budgeted between the latch point and presentation.
    ///
    /// Always at least one nanosecond, so the latch point strictly precedes
    /// the presentation time.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "estimates are non-negative and far below u64::MAX"
    )]
    pub fn required_frame_duration(&self) -> Duration {
        let render = self.render.get_or(self.initial_render.0 as f32);
        let update = self.update.get_or(self.initial_update.0 as f32);
        let budget = ((render + update) * self.safety_multiplier).ceil().max(1.0);
        Duration(budget as u64)
    }

    /// Predicts the next frame satisfying `request`.
    #[must_use]
    pub fn get_prediction(&self, request: &PredictionRequest) -> PredictedTimes {
        let required = self.required_frame_duration();
        let earliest = request
            .now
            .saturating_add(required)
            .max(request.requested_presentation_time);
        let presentation_time =
            earliest.next_vsync_after(request.last_vsync_time, request.vsync_interval);
        let latch_point_time = presentation_time.saturating_sub(required).max(request.now);
        PredictedTimes {
            latch_point_time,
            presentation_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VSYNC: Duration = Duration(16_000_000);

    fn predictor() -> FramePredictor {
        FramePredictor::new(&SchedulerConfig {
            vsync_interval: VSYNC,
            initial_render_duration: Duration::from_millis(4),
            initial_update_duration: Duration::from_millis(1),
            safety_multiplier: 1.0,
            ..SchedulerConfig::hz60()
        })
    }

    fn request(now: u64, requested: u64) -> PredictionRequest {
        PredictionRequest {
            now: HostTime(now),
            requested_presentation_time: HostTime(requested),
            last_vsync_time: HostTime(0),
            vsync_interval: VSYNC,
        }
    }

    #[test]
    fn asap_targets_next_vsync() {
        let p = predictor();
        let times = p.get_prediction(&request(0, 0));
        assert_eq!(times.presentation_time, HostTime(16_000_000));
        assert_eq!(times.latch_point_time, HostTime(11_000_000), "5ms before vsync");
    }

    #[test]
    fn late_request_skips_a_vsync() {
        let p = predictor();
        let times = p.get_prediction(&request(12_000_000, 0));
        assert_eq!(
            times.presentation_time,
            HostTime(32_000_000),
            "not enough room for the next vsync"
        );
        assert!(times.latch_point_time >= HostTime(12_000_000));
    }

    #[test]
    fn requested_time_is_respected() {
        let p = predictor();
        let times = p.get_prediction(&request(0, 40_000_000));
        assert_eq!(times.presentation_time, HostTime(48_000_000));
        assert_eq!(times.latch_point_time, HostTime(43_000_000));
    }

    #[test]
    fn latch_precedes_presentation() {
        let mut p = predictor();
        p.report_render_duration(Duration::ZERO);
        p.report_update_duration(Duration::ZERO);
        assert_eq!(p.required_frame_duration(), Duration(1), "budget never collapses");
        let times = p.get_prediction(&request(5, 0));
        assert!(times.latch_point_time < times.presentation_time);
        assert!(times.latch_point_time >= HostTime(5));
    }

    #[test]
    fn measurements_replace_initial_estimates() {
        let mut p = predictor();
        p.report_render_duration(Duration::from_millis(10));
        p.report_update_duration(Duration::from_millis(2));
        assert_eq!(p.required_frame_duration(), Duration::from_millis(12));
    }
}
