// SPDX-License-Identifier: MIT

//! Plain-value configuration passed to schedulers at construction

use std::time::Duration;

/// Grace period for in-flight nodes after cancellation when no node timeout is set
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Configuration for `GraphScheduler` and `WorkflowScheduler`
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Retries per node after the first attempt; nodes may override
    pub max_retries: u32,
    /// Delay before each retry attempt
    pub retry_delay: Duration,
    /// Cap on concurrently running nodes; `None` means unbounded
    pub max_concurrency: Option<usize>,
    /// Budget for a single attempt of a node
    pub node_timeout: Option<Duration>,
    /// Budget for the whole run
    pub execution_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::ZERO,
            max_concurrency: None,
            node_timeout: None,
            execution_timeout: None,
        }
    }
}

impl SchedulerConfig {
    /// How long a running node may take to return once the run is cancelled
    pub fn cancel_grace(&self) -> Duration {
        self.node_timeout.unwrap_or(DEFAULT_CANCEL_GRACE)
    }
}

/// Safety bounds for `SwarmCoordinator`
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmConfig {
    /// Cap on handoff transitions in one run
    pub max_handoffs: u32,
    /// Cap on node invocations, entry included
    pub max_iterations: u32,
    /// Budget for the whole run
    pub execution_timeout: Duration,
    /// Budget for a single invocation
    pub per_node_timeout: Duration,
    /// Number of recent handoffs inspected for ping-pong; 0 disables the check
    pub repetitive_handoff_detection_window: usize,
    /// Minimum agents appearing exactly once within the window
    pub min_unique_agents_in_window: usize,
    /// Retries of a failing invocation before the run stops
    pub max_retries: u32,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_handoffs: 20,
            max_iterations: 20,
            execution_timeout: Duration::from_secs(900),
            per_node_timeout: Duration::from_secs(300),
            repetitive_handoff_detection_window: 0,
            min_unique_agents_in_window: 0,
            max_retries: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_grace_follows_node_timeout() {
        let mut config = SchedulerConfig::default();
        assert_eq!(config.cancel_grace(), DEFAULT_CANCEL_GRACE);

        config.node_timeout = Some(Duration::from_millis(250));
        assert_eq!(config.cancel_grace(), Duration::from_millis(250));
    }

    #[test]
    fn test_swarm_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.max_handoffs, 20);
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.repetitive_handoff_detection_window, 0);
    }
}
