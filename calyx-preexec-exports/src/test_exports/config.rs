//! This file defines testing tools related to the configuration

use calyx_time::CalyxTime;

use crate::PreExecutionConfig;

/// Default value of `PreExecutionConfig` used for tests
impl Default for PreExecutionConfig {
    fn default() -> Self {
        Self {
            tx_timeout: CalyxTime::from_millis(1_000),
            global_budget: CalyxTime::from_millis(5_000),
            sweeper_interval: CalyxTime::from_millis(10),
            poll_interval: CalyxTime::from_millis(10),
        }
    }
}
