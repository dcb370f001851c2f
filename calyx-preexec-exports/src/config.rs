use calyx_time::CalyxTime;

/// Pre-execution module configuration
#[derive(Debug, Clone)]
pub struct PreExecutionConfig {
    /// budget granted to each transaction inside the applier (default 1 s)
    pub tx_timeout: CalyxTime,
    /// wall-clock budget after which the sweeper cancels a running job (default 5 s)
    pub global_budget: CalyxTime,
    /// cadence of the expiry sweeper (default 10 ms)
    pub sweeper_interval: CalyxTime,
    /// sleep between completion probes on the synchronous paths (default 10 ms)
    pub poll_interval: CalyxTime,
}
