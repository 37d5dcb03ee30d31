use std::time::Duration;

use crate::config::NetworkConfig;

/// Step-back retry schedule for transient failures.
///
/// The delay grows in bands rather than doubling: immediate, then 5, 10, 30,
/// 60 and finally 180 units. `unit` is one second in production.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Length of one schedule unit
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 30,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self {
            max_retries: network.max_retries,
            unit: Duration::from_millis(network.retry_unit_ms),
        }
    }

    /// Retries without waiting between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            unit: Duration::ZERO,
        }
    }

    /// Band for the given number of retries already performed
    pub fn stepback_units(retries: u32) -> u32 {
        match retries {
            0 => 0,
            1..=4 => 5,
            5..=9 => 10,
            10..=14 => 30,
            15..=19 => 60,
            _ => 180,
        }
    }

    pub fn delay(&self, retries: u32) -> Duration {
        self.unit * Self::stepback_units(retries)
    }
}
