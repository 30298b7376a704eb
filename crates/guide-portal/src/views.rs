//! Debounced view counting.
//!
//! Each guide has its own [`ViewWindow`]. A burst of views collapses into one
//! remote increment. After an increment the guide cools down: a send that
//! comes due before the cooldown ends is dropped, not retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use portal_common::remote::GuideService;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

pub const MIN_COOLDOWN: Duration = Duration::from_millis(2000);
pub const MAX_COOLDOWN: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    /// Quiet period after the last view before the increment is sent.
    pub debounce: Duration,
    /// Upper bound between the first view of a burst and the increment.
    pub max_wait: Duration,
    /// How long views are ignored after an increment.
    pub cooldown: Duration,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            max_wait: Duration::from_millis(4000),
            cooldown: Duration::from_millis(2000),
        }
    }
}

impl ViewSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_COOLDOWN..=MAX_COOLDOWN).contains(&self.cooldown) {
            return Err(format!(
                "view cooldown must be between {} and {} ms, got {}",
                MIN_COOLDOWN.as_millis(),
                MAX_COOLDOWN.as_millis(),
                self.cooldown.as_millis()
            ));
        }
        if self.max_wait < self.debounce {
            return Err("view max wait must not be shorter than the debounce".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewWindow {
    Idle,
    PendingSend {
        first_at: Instant,
        deadline: Instant,
    },
    InCooldown {
        until: Instant,
    },
    /// Views arrived during a cooldown. The send is dropped if it comes due
    /// before the cooldown ends.
    PendingInCooldown {
        until: Instant,
        first_at: Instant,
        deadline: Instant,
    },
}

impl ViewWindow {
    /// State after a view at `now`.
    pub fn on_view(self, now: Instant, settings: &ViewSettings) -> Self {
        let debounced =
            |first_at: Instant| (now + settings.debounce).min(first_at + settings.max_wait);
        match self {
            ViewWindow::Idle => ViewWindow::PendingSend {
                first_at: now,
                deadline: now + settings.debounce,
            },
            ViewWindow::PendingSend { first_at, .. } => ViewWindow::PendingSend {
                first_at,
                deadline: debounced(first_at),
            },
            ViewWindow::InCooldown { until } if now >= until => {
                ViewWindow::Idle.on_view(now, settings)
            }
            ViewWindow::InCooldown { until } => ViewWindow::PendingInCooldown {
                until,
                first_at: now,
                deadline: now + settings.debounce,
            },
            ViewWindow::PendingInCooldown { until, first_at, .. } if now >= until => {
                ViewWindow::PendingSend {
                    first_at,
                    deadline: debounced(first_at),
                }
            }
            ViewWindow::PendingInCooldown { until, first_at, .. } => {
                ViewWindow::PendingInCooldown {
                    until,
                    first_at,
                    deadline: debounced(first_at),
                }
            }
        }
    }

    /// Applies every timer due at `now`. Returns the new state and whether
    /// an increment must be issued.
    pub fn advance(self, now: Instant, settings: &ViewSettings) -> (Self, bool) {
        let cooling = ViewWindow::InCooldown {
            until: now + settings.cooldown,
        };
        match self {
            ViewWindow::PendingSend { deadline, .. } if now >= deadline => (cooling, true),
            ViewWindow::InCooldown { until } if now >= until => (ViewWindow::Idle, false),
            ViewWindow::PendingInCooldown { until, deadline, .. } if now >= deadline => {
                if deadline >= until {
                    (cooling, true)
                } else {
                    (ViewWindow::InCooldown { until }, false)
                }
            }
            ViewWindow::PendingInCooldown {
                until,
                first_at,
                deadline,
            } if now >= until => (ViewWindow::PendingSend { first_at, deadline }, false),
            other => (other, false),
        }
    }

    /// Next instant at which [`advance`](Self::advance) may change the state.
    pub fn next_wake(&self) -> Option<Instant> {
        match *self {
            ViewWindow::Idle => None,
            ViewWindow::PendingSend { deadline, .. } => Some(deadline),
            ViewWindow::InCooldown { until } => Some(until),
            ViewWindow::PendingInCooldown {
                until, deadline, ..
            } => Some(until.min(deadline)),
        }
    }
}

#[derive(Default)]
struct Tracked {
    windows: HashMap<String, ViewWindow>,
    drivers: HashMap<String, JoinHandle<()>>,
}

type State = Arc<Mutex<Tracked>>;

fn lock(state: &State) -> MutexGuard<'_, Tracked> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the per-guide windows and the timers driving them. Dropping the
/// tracker cancels pending sends.
pub struct ViewTracker {
    remote: Arc<dyn GuideService>,
    settings: ViewSettings,
    state: State,
}

impl ViewTracker {
    pub fn new(remote: Arc<dyn GuideService>, settings: ViewSettings) -> Self {
        Self {
            remote,
            settings,
            state: Arc::default(),
        }
    }

    pub fn window(&self, guide_id: &str) -> ViewWindow {
        lock(&self.state)
            .windows
            .get(guide_id)
            .copied()
            .unwrap_or(ViewWindow::Idle)
    }

    pub fn record_view(&self, guide_id: &str) {
        let now = Instant::now();
        let mut state = lock(&self.state);
        match state.windows.get(guide_id).copied() {
            Some(current) => {
                let next = current.on_view(now, &self.settings);
                debug!(guide_id, window = ?next, "view recorded");
                state.windows.insert(guide_id.to_string(), next);
            }
            None => {
                let next = ViewWindow::Idle.on_view(now, &self.settings);
                state.windows.insert(guide_id.to_string(), next);
                let driver = tokio::spawn(drive(
                    guide_id.to_string(),
                    Arc::clone(&self.remote),
                    Arc::clone(&self.state),
                    self.settings,
                ));
                state.drivers.insert(guide_id.to_string(), driver);
            }
        }
    }

    /// Cancels every pending send and cooldown timer.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        for (_, driver) in state.drivers.drain() {
            driver.abort();
        }
        state.windows.clear();
    }
}

impl Drop for ViewTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs one guide's window until it is idle again. The window entry exists
/// exactly as long as its driver does.
async fn drive(
    guide_id: String,
    remote: Arc<dyn GuideService>,
    state: State,
    settings: ViewSettings,
) {
    loop {
        let wake = match lock(&state).windows.get(&guide_id).and_then(|w| w.next_wake()) {
            Some(wake) => wake,
            None => return,
        };
        sleep_until(wake).await;

        let send = {
            let mut tracked = lock(&state);
            let Some(window) = tracked.windows.get(&guide_id).copied() else {
                return;
            };
            let (next, send) = window.advance(Instant::now(), &settings);
            if next == ViewWindow::Idle {
                tracked.windows.remove(&guide_id);
                tracked.drivers.remove(&guide_id);
                return;
            }
            tracked.windows.insert(guide_id.clone(), next);
            if matches!(
                (window, next),
                (ViewWindow::PendingInCooldown { .. }, ViewWindow::InCooldown { .. })
            ) {
                debug!(guide_id = %guide_id, "view dropped, guide still cooling down");
            }
            send
        };

        if send {
            debug!(guide_id = %guide_id, "sending view increment");
            if let Err(e) = remote.increment_views(&guide_id).await {
                debug!(guide_id = %guide_id, error = %e, "view increment failed, dropping it");
            }
        }
    }
}
