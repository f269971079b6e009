//! Fault profiles: canned impairment presets plus per-field overrides.

use crate::fault::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Probabilistic impairments applied to a streaming session.
///
/// All `*_percent` / `*_chance` fields are percentages in `[0, 100]`.
/// A profile is immutable once a trial starts: the session takes it by
/// value and the orchestrator builds a fresh one per trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaultProfile {
    pub drop_percent: f64,
    pub drop_burst_percent: f64,
    pub drop_burst_len: u32,
    pub interval_jitter_ms: u64,
    pub latency_spike_ms: u64,
    pub latency_spike_chance: f64,
    pub malformed_chance: f64,
    pub disconnect_chance: f64,
    pub command_ignore_chance: f64,
    pub rssi_base_dbm: i16,
    pub rssi_wave_amplitude: i16,
    pub rssi_wave_period_s: u32,
    pub rssi_drift_dbm: f64,
    /// Below this synthesized RSSI, `rssi_drop_extra_percent` is added to
    /// the per-packet drop probability.
    pub rssi_drop_threshold_dbm: i16,
    pub rssi_drop_extra_percent: f64,
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            drop_percent: 0.0,
            drop_burst_percent: 0.0,
            drop_burst_len: 0,
            interval_jitter_ms: 0,
            latency_spike_ms: 0,
            latency_spike_chance: 0.0,
            malformed_chance: 0.0,
            disconnect_chance: 0.0,
            command_ignore_chance: 0.0,
            rssi_base_dbm: -55,
            rssi_wave_amplitude: 0,
            rssi_wave_period_s: 0,
            rssi_drift_dbm: 0.0,
            rssi_drop_threshold_dbm: -80,
            rssi_drop_extra_percent: 5.0,
        }
    }
}

impl FaultProfile {
    /// Resolve a named preset. Names match the lab scenarios.
    pub fn preset(name: &str) -> ConfigResult<Self> {
        match name {
            "best" | "baseline" => Ok(Self::best()),
            "typical" => Ok(Self::typical()),
            "body_block" => Ok(Self::body_block()),
            "pocket" => Ok(Self::pocket()),
            "worst" => Ok(Self::worst()),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    pub fn all_preset_names() -> &'static [&'static str] {
        &["best", "typical", "body_block", "pocket", "worst"]
    }

    /// Ideal channel: no impairments at all.
    pub fn best() -> Self {
        Self::default()
    }

    /// Everyday wear: light loss with occasional short bursts.
    pub fn typical() -> Self {
        Self {
            drop_percent: 1.0,
            drop_burst_percent: 1.0,
            drop_burst_len: 2,
            interval_jitter_ms: 3,
            latency_spike_ms: 10,
            latency_spike_chance: 2.0,
            rssi_wave_amplitude: 3,
            rssi_wave_period_s: 50,
            ..Self::default()
        }
    }

    /// Body between ring and host.
    pub fn body_block() -> Self {
        Self {
            drop_percent: 3.0,
            drop_burst_percent: 5.0,
            drop_burst_len: 3,
            interval_jitter_ms: 5,
            latency_spike_ms: 15,
            latency_spike_chance: 5.0,
            rssi_wave_amplitude: 6,
            rssi_wave_period_s: 40,
            ..Self::default()
        }
    }

    /// Host phone in a pocket.
    pub fn pocket() -> Self {
        Self {
            drop_percent: 2.0,
            drop_burst_percent: 3.0,
            drop_burst_len: 2,
            interval_jitter_ms: 4,
            latency_spike_ms: 12,
            latency_spike_chance: 3.0,
            rssi_wave_amplitude: 4,
            rssi_wave_period_s: 60,
            ..Self::default()
        }
    }

    /// Hostile RF environment, including rare simulated disconnects.
    pub fn worst() -> Self {
        Self {
            drop_percent: 5.0,
            drop_burst_percent: 10.0,
            drop_burst_len: 4,
            interval_jitter_ms: 8,
            latency_spike_ms: 25,
            latency_spike_chance: 8.0,
            disconnect_chance: 0.5,
            rssi_wave_amplitude: 8,
            rssi_wave_period_s: 30,
            ..Self::default()
        }
    }

    /// Replace the fields set in `overrides`, then validate the result.
    pub fn apply(mut self, overrides: &FaultOverrides) -> ConfigResult<Self> {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = overrides.$field { self.$field = v; })*
            };
        }
        merge!(
            drop_percent,
            drop_burst_percent,
            drop_burst_len,
            interval_jitter_ms,
            latency_spike_ms,
            latency_spike_chance,
            malformed_chance,
            disconnect_chance,
            command_ignore_chance,
            rssi_base_dbm,
            rssi_wave_amplitude,
            rssi_wave_period_s,
            rssi_drift_dbm,
            rssi_drop_threshold_dbm,
            rssi_drop_extra_percent,
        );
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let percents = [
            ("drop_percent", self.drop_percent),
            ("drop_burst_percent", self.drop_burst_percent),
            ("latency_spike_chance", self.latency_spike_chance),
            ("malformed_chance", self.malformed_chance),
            ("disconnect_chance", self.disconnect_chance),
            ("command_ignore_chance", self.command_ignore_chance),
            ("rssi_drop_extra_percent", self.rssi_drop_extra_percent),
        ];
        for (field, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::PercentOutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// Partial profile: only the set fields replace the preset values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultOverrides {
    pub drop_percent: Option<f64>,
    pub drop_burst_percent: Option<f64>,
    pub drop_burst_len: Option<u32>,
    pub interval_jitter_ms: Option<u64>,
    pub latency_spike_ms: Option<u64>,
    pub latency_spike_chance: Option<f64>,
    pub malformed_chance: Option<f64>,
    pub disconnect_chance: Option<f64>,
    pub command_ignore_chance: Option<f64>,
    pub rssi_base_dbm: Option<i16>,
    pub rssi_wave_amplitude: Option<i16>,
    pub rssi_wave_period_s: Option<u32>,
    pub rssi_drift_dbm: Option<f64>,
    pub rssi_drop_threshold_dbm: Option<i16>,
    pub rssi_drop_extra_percent: Option<f64>,
}

impl FaultOverrides {
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| {
                v.as_object()
                    .map(|m| m.values().all(|f| f.is_null()))
                    .unwrap_or(true)
            })
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        for name in FaultProfile::all_preset_names() {
            assert!(FaultProfile::preset(name).is_ok(), "preset {name}");
        }
        assert!(matches!(
            FaultProfile::preset("cellar"),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_best_has_no_impairments() {
        let p = FaultProfile::best();
        assert_eq!(p.drop_percent, 0.0);
        assert_eq!(p.disconnect_chance, 0.0);
        assert_eq!(p.drop_burst_len, 0);
    }

    #[test]
    fn test_worst_includes_disconnects() {
        let p = FaultProfile::worst();
        assert_eq!(p.drop_percent, 5.0);
        assert_eq!(p.disconnect_chance, 0.5);
        assert_eq!(p.drop_burst_len, 4);
    }

    #[test]
    fn test_overrides_replace_only_set_fields() {
        let overrides = FaultOverrides {
            drop_percent: Some(12.5),
            ..Default::default()
        };
        let p = FaultProfile::typical().apply(&overrides).unwrap();
        assert_eq!(p.drop_percent, 12.5);
        // Untouched fields keep the preset values.
        assert_eq!(p.drop_burst_len, 2);
        assert_eq!(p.interval_jitter_ms, 3);
    }

    #[test]
    fn test_percent_out_of_range_rejected() {
        let overrides = FaultOverrides {
            malformed_chance: Some(101.0),
            ..Default::default()
        };
        let err = FaultProfile::best().apply(&overrides).unwrap_err();
        assert!(matches!(err, ConfigError::PercentOutOfRange { .. }));

        let overrides = FaultOverrides {
            drop_percent: Some(-1.0),
            ..Default::default()
        };
        assert!(FaultProfile::best().apply(&overrides).is_err());
    }

    #[test]
    fn test_overrides_empty_detection() {
        assert!(FaultOverrides::default().is_empty());
        let o = FaultOverrides {
            drop_burst_len: Some(3),
            ..Default::default()
        };
        assert!(!o.is_empty());
    }
}
