//! Fixed electrical load used to synthesize meter readings

use std::time::Duration;

/// Constant voltage/current profile of the simulated load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProfile {
    pub voltage: f64,
    pub current: f64,
}

impl LoadProfile {
    pub fn new(voltage: f64, current: f64) -> Self {
        Self { voltage, current }
    }

    /// Instantaneous active power in W.
    pub fn power_w(&self) -> f64 {
        self.voltage * self.current
    }

    /// Energy delivered over `interval` at constant power, in Wh.
    pub fn energy_over(&self, interval: Duration) -> f64 {
        self.power_w() * (interval.as_secs_f64() / 3600.0)
    }
}

/// One set of sampled values reported in a MeterValues call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSample {
    pub energy_wh: f64,
    pub current_a: f64,
    pub voltage_v: f64,
    pub power_w: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_integrates_power_over_interval() {
        let load = LoadProfile::new(230.0, 16.0);
        assert_eq!(load.power_w(), 3680.0);
        let wh = load.energy_over(Duration::from_secs(20));
        assert!((wh - 3680.0 * 20.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn zero_current_delivers_nothing() {
        let load = LoadProfile::new(230.0, 0.0);
        assert_eq!(load.energy_over(Duration::from_secs(60)), 0.0);
    }
}
