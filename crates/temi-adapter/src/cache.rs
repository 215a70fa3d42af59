//! [`TelemetryCache`] – last-known robot state.
//!
//! One update method per telemetry kind; each replaces its whole field group
//! under a single write lock, so readers never observe half of an update.
//! Reads take the read lock just long enough to clone what they need.
//!
//! Navigation goal changes are additionally pushed through a
//! [`tokio::sync::watch`] channel so callers can await progress instead of
//! polling.

use parking_lot::RwLock;
use temi_types::{BatteryStatus, DurationEstimate, NavGoal, NavStatus, Pose, RobotState};
use tokio::sync::watch;

/// Telemetry field group touched by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryKind {
    Locations,
    Battery,
    Pose,
    Duration,
    NavGoal,
    User,
}

/// Shared, lock-protected [`RobotState`].
pub struct TelemetryCache {
    state: RwLock<RobotState>,
    nav: watch::Sender<NavGoal>,
}

impl TelemetryCache {
    /// Cache starting from the robot's power-on defaults.
    pub fn new() -> Self {
        Self::with_state(RobotState::default())
    }

    pub fn with_state(state: RobotState) -> Self {
        let (nav, _) = watch::channel(state.nav_goal.clone());
        Self {
            state: RwLock::new(state),
            nav,
        }
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> RobotState {
        self.state.read().clone()
    }

    /// Run `f` against the current state under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&RobotState) -> R) -> R {
        f(&self.state.read())
    }

    pub fn set_locations(&self, locations: Vec<String>) {
        self.state.write().locations = locations;
    }

    pub fn set_battery(&self, battery: BatteryStatus) {
        self.state.write().battery = Some(battery);
    }

    pub fn set_pose(&self, pose: Pose) {
        self.state.write().pose = pose;
    }

    pub fn set_duration(&self, duration: DurationEstimate) {
        self.state.write().duration_estimate = duration;
    }

    pub fn set_detected_user(&self, user: serde_json::Value) {
        self.state.write().last_detected_user = Some(user);
    }

    pub fn set_nav_goal(&self, goal: NavGoal) {
        let mut state = self.state.write();
        state.nav_goal = goal.clone();
        // Published while the write lock is held so watchers see goals in
        // the same order as the cache.
        self.nav.send_replace(goal);
    }

    /// Record that navigation towards `location` has been requested.
    pub fn mark_navigation_start(&self, location: &str) {
        self.set_nav_goal(NavGoal {
            location: location.to_string(),
            status: NavStatus::Start,
        });
    }

    /// Receiver that observes every navigation goal change.
    pub fn subscribe_nav(&self) -> watch::Receiver<NavGoal> {
        self.nav.subscribe()
    }
}

impl Default for TelemetryCache {
    fn default() -> Self {
        Self::new()
    }
}
