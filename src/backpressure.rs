//! Decides whether an admission should be allowed, blocked, or dropped.

use crate::queue_monitor::{BackpressureLevel, QueueMonitor, QueueMonitorConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
    Drop,
}

#[derive(Debug, Clone, Copy)]
pub struct BackpressureConfig {
    pub block_on_full: bool,
    pub drop_on_full: bool,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { block_on_full: false, drop_on_full: false }
    }
}

#[derive(Debug, Default)]
pub struct BackpressureStats {
    pub blocked: AtomicU64,
    pub dropped: AtomicU64,
}

/// Wraps a [`QueueMonitor`] with admission policy flags.
pub struct BackpressureHandler {
    monitor: Arc<QueueMonitor>,
    config: BackpressureConfig,
    stats: BackpressureStats,
}

impl BackpressureHandler {
    pub fn new(monitor_config: QueueMonitorConfig, config: BackpressureConfig) -> Self {
        Self { monitor: Arc::new(QueueMonitor::new(monitor_config)), config, stats: BackpressureStats::default() }
    }

    pub fn with_monitor(monitor: Arc<QueueMonitor>, config: BackpressureConfig) -> Self {
        Self { monitor, config, stats: BackpressureStats::default() }
    }

    pub fn monitor(&self) -> &Arc<QueueMonitor> {
        &self.monitor
    }

    /// Decide the admission outcome for `current_size`, per the rule table:
    /// at or below critical, always allow; at overflow, block wins over drop
    /// if both are configured; with neither configured, allow (the bounded
    /// channel's own semantics take over downstream).
    pub fn decide(&self, current_size: usize) -> Decision {
        let level = self.monitor.update(current_size);
        let decision = match level {
            BackpressureLevel::Overflow => {
                if self.config.block_on_full {
                    Decision::Block
                } else if self.config.drop_on_full {
                    Decision::Drop
                } else {
                    Decision::Allow
                }
            }
            _ => Decision::Allow,
        };

        match decision {
            Decision::Block => {
                self.stats.blocked.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Drop => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Allow => {}
        }
        decision
    }

    pub fn blocked_total(&self) -> u64 {
        self.stats.blocked.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_config() -> QueueMonitorConfig {
        QueueMonitorConfig { capacity: 100, warning_pct: 50.0, critical_pct: 80.0, overflow_pct: 95.0 }
    }

    #[test]
    fn allows_below_overflow_regardless_of_flags() {
        let handler = BackpressureHandler::new(
            monitor_config(),
            BackpressureConfig { block_on_full: true, drop_on_full: true },
        );
        assert_eq!(handler.decide(90), Decision::Allow);
    }

    #[test]
    fn block_wins_when_both_flags_set() {
        let handler = BackpressureHandler::new(
            monitor_config(),
            BackpressureConfig { block_on_full: true, drop_on_full: true },
        );
        assert_eq!(handler.decide(99), Decision::Block);
        assert_eq!(handler.blocked_total(), 1);
    }

    #[test]
    fn drops_when_only_drop_configured() {
        let handler = BackpressureHandler::new(
            monitor_config(),
            BackpressureConfig { block_on_full: false, drop_on_full: true },
        );
        assert_eq!(handler.decide(99), Decision::Drop);
        assert_eq!(handler.dropped_total(), 1);
    }

    #[test]
    fn allows_at_overflow_when_neither_flag_set() {
        let handler = BackpressureHandler::new(monitor_config(), BackpressureConfig::default());
        assert_eq!(handler.decide(99), Decision::Allow);
        assert_eq!(handler.blocked_total(), 0);
        assert_eq!(handler.dropped_total(), 0);
    }
}
