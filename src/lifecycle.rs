//! Client lifecycle state machine: `active -> draining -> closed`.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

const STATE_ACTIVE: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Active,
    Draining,
    Closed,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClientState::Active => "active",
            ClientState::Draining => "draining",
            ClientState::Closed => "closed",
        };
        f.write_str(s)
    }
}

fn state_from_u8(v: u8) -> ClientState {
    match v {
        STATE_ACTIVE => ClientState::Active,
        STATE_DRAINING => ClientState::Draining,
        STATE_CLOSED => ClientState::Closed,
        _ => unreachable!("invalid lifecycle state"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleError;

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client is not active")
    }
}

impl std::error::Error for LifecycleError {}

pub type StateChangeCallback = Arc<dyn Fn(ClientState, ClientState) + Send + Sync>;

struct Counters {
    idle_warnings: AtomicUsize,
}

/// Tracks `active -> draining -> closed` progression, activity timestamps,
/// and an idle-warning ticker.
pub struct LifecycleManager {
    state: AtomicU8,
    created_at: Instant,
    last_activity_millis: AtomicU64,
    idle_warning_duration: Duration,
    on_change: Mutex<Option<StateChangeCallback>>,
    counters: Counters,
    idle_warned: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl LifecycleManager {
    pub fn new(idle_warning_duration: Duration) -> Self {
        Self {
            state: AtomicU8::new(STATE_ACTIVE),
            created_at: Instant::now(),
            last_activity_millis: AtomicU64::new(0),
            idle_warning_duration,
            on_change: Mutex::new(None),
            counters: Counters { idle_warnings: AtomicUsize::new(0) },
            idle_warned: std::sync::atomic::AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn on_state_change<F>(self: Arc<Self>, f: F) -> Arc<Self>
    where
        F: Fn(ClientState, ClientState) + Send + Sync + 'static,
    {
        *self.on_change.lock().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(f));
        self
    }

    pub fn state(&self) -> ClientState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_duration(&self) -> Duration {
        let last = self.last_activity_millis.load(Ordering::Acquire);
        let now_millis = self.created_at.elapsed().as_millis() as u64;
        Duration::from_millis(now_millis.saturating_sub(last))
    }

    pub fn idle_warning_count(&self) -> usize {
        self.counters.idle_warnings.load(Ordering::Relaxed)
    }

    pub fn record_activity(&self) {
        let now_millis = self.created_at.elapsed().as_millis() as u64;
        self.last_activity_millis.store(now_millis, Ordering::Release);
        self.idle_warned.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        if self.state.compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            if let Some(cb) = self.on_change.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
                cb(state_from_u8(from), state_from_u8(to));
            }
            self.notify.notify_waiters();
            true
        } else {
            false
        }
    }

    /// `active -> draining`. Errors if the client is already non-active.
    pub fn begin_shutdown(&self) -> Result<(), LifecycleError> {
        if self.transition(STATE_ACTIVE, STATE_DRAINING) {
            tracing::info!("lifecycle: active -> draining");
            Ok(())
        } else {
            Err(LifecycleError)
        }
    }

    /// `draining -> closed`.
    pub fn complete_shutdown(&self) {
        if self.transition(STATE_DRAINING, STATE_CLOSED) {
            tracing::info!("lifecycle: draining -> closed");
        }
    }

    /// Checks whether `idle_duration() > idle_warning_duration` and, if so and
    /// this hasn't already fired since the last activity, records a warning.
    /// Returns true exactly once per idle period.
    pub fn check_idle_warning(&self) -> bool {
        if self.state() != ClientState::Active {
            return false;
        }
        if self.idle_duration() <= self.idle_warning_duration {
            return false;
        }
        if self
            .idle_warned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.counters.idle_warnings.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(idle = ?self.idle_duration(), "lifecycle: client idle");
            true
        } else {
            false
        }
    }

    /// Runs an idle-detection ticker until the client leaves `active`.
    pub async fn run_idle_ticker(self: Arc<Self>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        loop {
            if self.state() != ClientState::Active {
                return;
            }
            tokio::select! {
                _ = interval.tick() => {
                    self.check_idle_warning();
                }
                _ = self.notify.notified() => {
                    if self.state() != ClientState::Active {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_active() {
        let lc = LifecycleManager::new(Duration::from_secs(60));
        assert_eq!(lc.state(), ClientState::Active);
    }

    #[test]
    fn progression_is_linear_and_non_reversible() {
        let lc = LifecycleManager::new(Duration::from_secs(60));
        assert!(lc.begin_shutdown().is_ok());
        assert_eq!(lc.state(), ClientState::Draining);
        assert!(lc.begin_shutdown().is_err(), "cannot begin shutdown twice");
        lc.complete_shutdown();
        assert_eq!(lc.state(), ClientState::Closed);
    }

    #[test]
    fn state_change_callback_fires() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let lc = Arc::new(LifecycleManager::new(Duration::from_secs(60)))
            .on_state_change(move |from, to| seen_clone.lock().unwrap().push((from, to)));
        lc.begin_shutdown().unwrap();
        lc.complete_shutdown();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (ClientState::Active, ClientState::Draining),
                (ClientState::Draining, ClientState::Closed),
            ]
        );
    }

    #[test]
    fn idle_warning_fires_once_per_idle_period() {
        let lc = LifecycleManager::new(Duration::from_millis(0));
        assert!(lc.check_idle_warning());
        assert!(!lc.check_idle_warning(), "should not refire until activity resets it");
        lc.record_activity();
        assert!(lc.check_idle_warning());
        assert_eq!(lc.idle_warning_count(), 2);
    }

    #[test]
    fn idle_warning_never_fires_once_draining() {
        let lc = LifecycleManager::new(Duration::from_millis(0));
        lc.begin_shutdown().unwrap();
        assert!(!lc.check_idle_warning());
    }

    #[test]
    fn record_activity_resets_idle_duration() {
        let lc = LifecycleManager::new(Duration::from_secs(1));
        std::thread::sleep(Duration::from_millis(10));
        lc.record_activity();
        assert!(lc.idle_duration() < Duration::from_millis(10));
    }
}
