//! Tracks queue depth against capacity and classifies backpressure level.

use std::sync::Mutex;

/// Discrete queue-fullness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackpressureLevel {
    None,
    Warning,
    Critical,
    Overflow,
}

impl std::fmt::Display for BackpressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackpressureLevel::None => "none",
            BackpressureLevel::Warning => "warning",
            BackpressureLevel::Critical => "critical",
            BackpressureLevel::Overflow => "overflow",
        };
        f.write_str(s)
    }
}

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_WARNING_PCT: f64 = 50.0;
const DEFAULT_CRITICAL_PCT: f64 = 80.0;
const DEFAULT_OVERFLOW_PCT: f64 = 95.0;

#[derive(Debug, Clone, Copy)]
pub struct QueueMonitorConfig {
    pub capacity: usize,
    pub warning_pct: f64,
    pub critical_pct: f64,
    pub overflow_pct: f64,
}

impl Default for QueueMonitorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            warning_pct: DEFAULT_WARNING_PCT,
            critical_pct: DEFAULT_CRITICAL_PCT,
            overflow_pct: DEFAULT_OVERFLOW_PCT,
        }
    }
}

impl QueueMonitorConfig {
    /// Applies documented defaults to non-positive threshold values, per
    /// the "negative or zero values fall back to defaults" rule.
    pub fn apply_defaults(mut self) -> Self {
        if self.capacity == 0 {
            self.capacity = DEFAULT_CAPACITY;
        }
        if self.warning_pct <= 0.0 {
            self.warning_pct = DEFAULT_WARNING_PCT;
        }
        if self.critical_pct <= 0.0 {
            self.critical_pct = DEFAULT_CRITICAL_PCT;
        }
        if self.overflow_pct <= 0.0 {
            self.overflow_pct = DEFAULT_OVERFLOW_PCT;
        }
        self
    }
}

/// Cumulative counters maintained alongside the live classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMonitorStats {
    pub warning_entries: u64,
    pub critical_entries: u64,
    pub overflow_entries: u64,
    pub transitions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueState {
    pub size: usize,
    pub capacity: usize,
    pub percent_full: f64,
    pub level: BackpressureLevel,
}

struct Inner {
    last_level: BackpressureLevel,
    last_size: usize,
    stats: QueueMonitorStats,
}

/// A callback invoked exactly once per level transition (never on a same-level update).
pub type LevelChangeCallback =
    std::sync::Arc<dyn Fn(BackpressureLevel, BackpressureLevel) + Send + Sync>;

pub struct QueueMonitor {
    config: QueueMonitorConfig,
    inner: Mutex<Inner>,
    on_change: Option<LevelChangeCallback>,
}

impl QueueMonitor {
    pub fn new(config: QueueMonitorConfig) -> Self {
        Self {
            config: config.apply_defaults(),
            inner: Mutex::new(Inner {
                last_level: BackpressureLevel::None,
                last_size: 0,
                stats: QueueMonitorStats::default(),
            }),
            on_change: None,
        }
    }

    pub fn with_callback(mut self, cb: LevelChangeCallback) -> Self {
        self.on_change = Some(cb);
        self
    }

    fn classify(&self, current_size: usize) -> (f64, BackpressureLevel) {
        let percent_full = if self.config.capacity == 0 {
            100.0
        } else {
            (current_size as f64 / self.config.capacity as f64) * 100.0
        };
        let level = if percent_full >= self.config.overflow_pct {
            BackpressureLevel::Overflow
        } else if percent_full >= self.config.critical_pct {
            BackpressureLevel::Critical
        } else if percent_full >= self.config.warning_pct {
            BackpressureLevel::Warning
        } else {
            BackpressureLevel::None
        };
        (percent_full, level)
    }

    /// Atomically updates state for `current_size` and returns the new classification.
    /// Fires the level-change callback exactly once when the level differs from
    /// the previous observation.
    pub fn update(&self, current_size: usize) -> BackpressureLevel {
        let (_, level) = self.classify(current_size);
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        let previous = guard.last_level;
        guard.last_size = current_size;

        if level != previous {
            guard.stats.transitions += 1;
            match level {
                BackpressureLevel::Warning => guard.stats.warning_entries += 1,
                BackpressureLevel::Critical => guard.stats.critical_entries += 1,
                BackpressureLevel::Overflow => guard.stats.overflow_entries += 1,
                BackpressureLevel::None => {}
            }
            guard.last_level = level;
            drop(guard);
            if let Some(cb) = &self.on_change {
                cb(previous, level);
            }
        }

        level
    }

    /// Current classification without mutating state (based on the last `update`).
    pub fn level(&self) -> BackpressureLevel {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).last_level
    }

    /// A coherent snapshot of the monitor's current state.
    pub fn state(&self) -> QueueState {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let (percent_full, _) = self.classify(guard.last_size);
        QueueState {
            size: guard.last_size,
            capacity: self.config.capacity,
            percent_full,
            level: guard.last_level,
        }
    }

    pub fn stats(&self) -> QueueMonitorStats {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).stats
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn classification_is_monotone_step_function() {
        let monitor = QueueMonitor::new(QueueMonitorConfig {
            capacity: 100,
            warning_pct: 50.0,
            critical_pct: 80.0,
            overflow_pct: 95.0,
        });

        for size in 0..=100 {
            let level = monitor.update(size);
            let expected = if size >= 95 {
                BackpressureLevel::Overflow
            } else if size >= 80 {
                BackpressureLevel::Critical
            } else if size >= 50 {
                BackpressureLevel::Warning
            } else {
                BackpressureLevel::None
            };
            assert_eq!(level, expected, "size={size}");
        }
    }

    #[test]
    fn defaults_applied_to_non_positive_thresholds() {
        let config = QueueMonitorConfig { capacity: 0, warning_pct: 0.0, critical_pct: -1.0, overflow_pct: 0.0 };
        let monitor = QueueMonitor::new(config);
        assert_eq!(monitor.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn callback_fires_exactly_once_per_transition() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let monitor = QueueMonitor::new(QueueMonitorConfig {
            capacity: 100,
            warning_pct: 50.0,
            critical_pct: 80.0,
            overflow_pct: 95.0,
        })
        .with_callback(Arc::new(move |_from, _to| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.update(10); // -> None, no transition from initial None
        assert_eq!(count.load(Ordering::SeqCst), 0);
        monitor.update(10); // same level again
        assert_eq!(count.load(Ordering::SeqCst), 0);
        monitor.update(60); // -> Warning
        assert_eq!(count.load(Ordering::SeqCst), 1);
        monitor.update(65); // still Warning
        assert_eq!(count.load(Ordering::SeqCst), 1);
        monitor.update(90); // -> Critical
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cumulative_counters_track_level_entries() {
        let monitor = QueueMonitor::new(QueueMonitorConfig::default().apply_defaults());
        monitor.update(600); // warning
        monitor.update(850); // critical
        monitor.update(960); // overflow
        monitor.update(10); // back to none
        monitor.update(600); // warning again
        let stats = monitor.stats();
        assert_eq!(stats.warning_entries, 2);
        assert_eq!(stats.critical_entries, 1);
        assert_eq!(stats.overflow_entries, 1);
        assert_eq!(stats.transitions, 5);
    }

    #[test]
    fn state_snapshot_is_coherent() {
        let monitor = QueueMonitor::new(QueueMonitorConfig::default());
        monitor.update(500);
        let state = monitor.state();
        assert_eq!(state.size, 500);
        assert_eq!(state.capacity, 1000);
        assert_eq!(state.percent_full, 50.0);
        assert_eq!(state.level, BackpressureLevel::Warning);
    }
}
