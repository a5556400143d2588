// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Engine configuration.
//!
//! Defaults match the driver's timing contract: a 1 s transmit watchdog
//! polled every 1 ms, and up to 15 BUF_XMIT attempts 50 ms apart.

use crate::device::DEFAULT_DEVICE_PATH;
use crate::sim::SimConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable enabling the simulated backend.
pub const ENV_SIM_ENABLE: &str = "CFOLIB_SIM_ENABLE";

/// Environment variable overriding the device path.
pub const ENV_DEVICE: &str = "CFOLIB_DEVICE";

/// Default transmit watchdog budget.
pub const DEFAULT_TRANSMIT_BUDGET: Duration = Duration::from_secs(1);

/// Default interval between transmit polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default number of BUF_XMIT attempts.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 15;

/// Default pause between BUF_XMIT attempts.
pub const DEFAULT_COMMIT_PAUSE: Duration = Duration::from_millis(50);

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimMode {
    /// Talk to the kernel driver.
    #[default]
    Disabled,
    /// Use the in-process simulator.
    Enabled,
}

impl SimMode {
    /// Parse the value of `CFOLIB_SIM_ENABLE`: anything but empty or `0`
    /// enables simulation.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("0") => Self::Disabled,
            Some(_) => Self::Enabled,
        }
    }
}

/// Configuration of a [`DmaEngine`](crate::DmaEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Device node of the card.
    pub device_path: PathBuf,
    /// Backend selection.
    pub mode: SimMode,
    /// Simulated card, used when `mode` is `Enabled`.
    pub sim: SimConfig,
    /// Timeout stored in every ring before the first query.
    pub initial_timeout_ms: u32,
    /// How long the transmit path waits for a free slot.
    pub transmit_budget: Duration,
    /// Interval between transmit polls.
    pub poll_interval: Duration,
    /// BUF_XMIT attempts before giving up.
    pub commit_attempts: u32,
    /// Pause between BUF_XMIT attempts.
    pub commit_pause: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            mode: SimMode::Disabled,
            sim: SimConfig::default(),
            initial_timeout_ms: 0,
            transmit_budget: DEFAULT_TRANSMIT_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            commit_pause: DEFAULT_COMMIT_PAUSE,
        }
    }
}

impl EngineConfig {
    /// Configuration for the simulated backend.
    pub fn simulated(sim: SimConfig) -> Self {
        Self {
            mode: SimMode::Enabled,
            sim,
            ..Self::default()
        }
    }

    /// Defaults overridden by `CFOLIB_SIM_ENABLE` and `CFOLIB_DEVICE`.
    pub fn from_env() -> Self {
        let sim = std::env::var(ENV_SIM_ENABLE).ok();
        let device = std::env::var_os(ENV_DEVICE);
        let mut config = Self {
            mode: SimMode::from_env_value(sim.as_deref()),
            ..Self::default()
        };
        if let Some(path) = device.filter(|p| !p.is_empty()) {
            config.device_path = PathBuf::from(path);
        }
        config
    }

    /// Set the device path.
    pub fn with_device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = path.into();
        self
    }

    /// Set the backend selection.
    pub fn with_mode(mut self, mode: SimMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the transmit watchdog budget and poll interval.
    pub fn with_transmit_budget(mut self, budget: Duration, interval: Duration) -> Self {
        self.transmit_budget = budget;
        self.poll_interval = interval;
        self
    }

    /// Set the BUF_XMIT retry policy.
    pub fn with_commit_retries(mut self, attempts: u32, pause: Duration) -> Self {
        self.commit_attempts = attempts;
        self.commit_pause = pause;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.mode, SimMode::Disabled);
        assert_eq!(config.device_path, PathBuf::from("/dev/cfo0"));
        assert_eq!(config.transmit_budget, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.commit_attempts, 15);
        assert_eq!(config.commit_pause, Duration::from_millis(50));
    }

    #[test]
    fn test_sim_mode_from_env_value() {
        assert_eq!(SimMode::from_env_value(None), SimMode::Disabled);
        assert_eq!(SimMode::from_env_value(Some("")), SimMode::Disabled);
        assert_eq!(SimMode::from_env_value(Some("0")), SimMode::Disabled);
        assert_eq!(SimMode::from_env_value(Some("1")), SimMode::Enabled);
        assert_eq!(SimMode::from_env_value(Some("yes")), SimMode::Enabled);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::simulated(SimConfig::default())
            .with_device_path("/dev/cfo1")
            .with_commit_retries(3, Duration::from_millis(5));
        assert_eq!(config.mode, SimMode::Enabled);
        assert_eq!(config.device_path, PathBuf::from("/dev/cfo1"));
        assert_eq!(config.commit_attempts, 3);
    }
}
