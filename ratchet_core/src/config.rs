// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tunables for the scheduler, sessions, and engine.
//!
//! Each section is a plain struct with `const fn` presets, usable directly
//! from code. [`RatchetConfig`] groups them and can be loaded from TOML:
//!
//! ```toml
//! [scheduler]
//! vsync_interval = 8333333
//! max_outstanding_frames = 2
//!
//! [session]
//! max_presents_in_flight = 3
//! ```
//!
//! Omitted fields keep their defaults.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::time::Duration;

/// Configuration for the [`FrameScheduler`](crate::scheduler::FrameScheduler).
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Nominal display refresh interval, used until presentation feedback
    /// arrives.
    pub vsync_interval: Duration,
    /// Frames that may be rendering or awaiting presentation at once.
    pub max_outstanding_frames: u32,
    /// Upper bound on the number of future presentation times returned to a
    /// client.
    pub max_prediction_count: u32,
    /// EMA smoothing factor for render and update durations (0.0–1.0).
    /// Smaller values = more smoothing.
    pub ema_alpha: f32,
    /// Multiplier applied to the smoothed durations to get the latch margin.
    pub safety_multiplier: f32,
    /// Render duration assumed before the first measurement.
    pub initial_render_duration: Duration,
    /// Update duration assumed before the first measurement.
    pub initial_update_duration: Duration,
}

impl SchedulerConfig {
    /// Defaults for a 60 Hz display.
    #[must_use]
    pub const fn hz60() -> Self {
        Self {
            vsync_interval: Duration(16_666_667),
            max_outstanding_frames: 1,
            max_prediction_count: 8,
            ema_alpha: 0.2,
            safety_multiplier: 1.25,
            initial_render_duration: Duration::from_millis(4),
            initial_update_duration: Duration::from_millis(1),
        }
    }

    /// Defaults for a 120 Hz display. Allows one extra frame in flight.
    #[must_use]
    pub const fn hz120() -> Self {
        Self {
            vsync_interval: Duration(8_333_333),
            max_outstanding_frames: 2,
            max_prediction_count: 8,
            ema_alpha: 0.2,
            safety_multiplier: 1.25,
            initial_render_duration: Duration::from_millis(3),
            initial_update_duration: Duration::from_micros(500),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.vsync_interval == Duration::ZERO {
            return Err(ConfigError::Invalid {
                field: "scheduler.vsync_interval",
                reason: "must be greater than zero",
            });
        }
        if self.max_outstanding_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.max_outstanding_frames",
                reason: "must be at least 1",
            });
        }
        if self.max_prediction_count == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.max_prediction_count",
                reason: "must be at least 1",
            });
        }
        if self.ema_alpha.is_nan() || self.ema_alpha <= 0.0 || self.ema_alpha > 1.0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.ema_alpha",
                reason: "must be in (0, 1]",
            });
        }
        if self.safety_multiplier.is_nan() || self.safety_multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.safety_multiplier",
                reason: "must be at least 1.0",
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::hz60()
    }
}

/// Per-session limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Presents a session may have queued or unacknowledged before further
    /// presents are rejected.
    pub max_presents_in_flight: u32,
}

impl SessionConfig {
    /// Default limits.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_presents_in_flight: 5,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine policy knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Render a frame when an update was scheduled for a session that no
    /// longer exists, so its removed content disappears from screen.
    pub render_on_missing_session: bool,
    /// Number of initial frames whose scheduling is logged at `debug` level.
    pub verbose_frame_count: u64,
}

impl EngineConfig {
    /// Default policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            render_on_missing_session: true,
            verbose_frame_count: 3,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete compositor configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatchetConfig {
    /// Frame scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Session settings.
    pub session: SessionConfig,
    /// Engine settings.
    pub engine: EngineConfig,
}

impl RatchetConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.message().to_owned()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.session.max_presents_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "session.max_presents_in_flight",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = RatchetConfig::from_toml_str("").unwrap();
        assert_eq!(config, RatchetConfig::default());
        assert_eq!(config.session.max_presents_in_flight, 5);
        assert!(config.engine.render_on_missing_session);
        assert_eq!(config.scheduler.max_outstanding_frames, 1);
        assert_eq!(config.scheduler.max_prediction_count, 8);
    }

    #[test]
    fn partial_sections_override_fields() {
        let config = RatchetConfig::from_toml_str(
            "[scheduler]\nvsync_interval = 8333333\nmax_outstanding_frames = 2\n\n\
             [engine]\nrender_on_missing_session = false\n",
        )
        .unwrap();
        assert_eq!(config.scheduler.vsync_interval, Duration(8_333_333));
        assert_eq!(config.scheduler.max_outstanding_frames, 2);
        assert_eq!(
            config.scheduler.max_prediction_count, 8,
            "unset fields keep defaults"
        );
        assert!(!config.engine.render_on_missing_session);
        assert_eq!(config.engine.verbose_frame_count, 3);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = RatchetConfig::from_toml_str("[scheduler]\nvsync_interval = 0\n").unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                field: "scheduler.vsync_interval",
                reason: "must be greater than zero",
            }
        );
        let err =
            RatchetConfig::from_toml_str("[session]\nmax_presents_in_flight = 0\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "session.max_presents_in_flight", .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        let err = RatchetConfig::from_toml_str("[scheduler]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
        let err = RatchetConfig::from_toml_str("not toml at all =").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn presets_are_valid() {
        assert!(SchedulerConfig::hz60().validate().is_ok());
        assert!(SchedulerConfig::hz120().validate().is_ok());
    }
}
