//! Synthesized RSSI: a slow sine wave plus long-term drift over a base
//! level, sampled on demand. The same value feeds the client's RSSI reads
//! and the scheduler's RSSI-coupled drop penalty.

use crate::fault::FaultProfile;
use crate::link::RssiSource;
use std::f64::consts::TAU;
use tokio::time::Instant;

/// Reported values stay inside the HCI range.
const RSSI_FLOOR_DBM: f64 = -127.0;
const RSSI_CEIL_DBM: f64 = -1.0;

pub struct RssiSynth {
    base_dbm: f64,
    wave_amplitude: f64,
    wave_period_s: f64,
    /// dBm added per minute of elapsed session time.
    drift_dbm_per_min: f64,
    started: Instant,
}

impl RssiSynth {
    pub fn from_profile(profile: &FaultProfile) -> Self {
        Self {
            base_dbm: profile.rssi_base_dbm as f64,
            wave_amplitude: profile.rssi_wave_amplitude as f64,
            wave_period_s: profile.rssi_wave_period_s as f64,
            drift_dbm_per_min: profile.rssi_drift_dbm,
            started: Instant::now(),
        }
    }

    pub fn sample_now(&mut self) -> i16 {
        let elapsed_s = self.started.elapsed().as_secs_f64();
        let wave = if self.wave_period_s > 0.0 {
            self.wave_amplitude * (TAU * elapsed_s / self.wave_period_s).sin()
        } else {
            0.0
        };
        let drift = self.drift_dbm_per_min * elapsed_s / 60.0;
        let value = self.base_dbm + wave + drift;
        value.clamp(RSSI_FLOOR_DBM, RSSI_CEIL_DBM).round() as i16
    }
}

impl RssiSource for RssiSynth {
    fn sample(&mut self) -> i16 {
        self.sample_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_flat_profile_reports_base() {
        let mut synth = RssiSynth::from_profile(&FaultProfile::best());
        assert_eq!(synth.sample_now(), -55);
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(synth.sample_now(), -55);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wave_peaks_at_quarter_period() {
        let profile = FaultProfile {
            rssi_wave_amplitude: 6,
            rssi_wave_period_s: 40,
            ..FaultProfile::best()
        };
        let mut synth = RssiSynth::from_profile(&profile);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(synth.sample_now(), -49);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(synth.sample_now(), -61);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_accumulates_per_minute() {
        let profile = FaultProfile {
            rssi_drift_dbm: -4.0,
            ..FaultProfile::best()
        };
        let mut synth = RssiSynth::from_profile(&profile);
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(synth.sample_now(), -61);
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_clamped_to_hci_range() {
        let profile = FaultProfile {
            rssi_base_dbm: -126,
            rssi_drift_dbm: -60.0,
            ..FaultProfile::best()
        };
        let mut synth = RssiSynth::from_profile(&profile);
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(synth.sample_now(), -127);
    }
}
