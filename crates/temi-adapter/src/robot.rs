//! [`Robot`] – the public face of the adapter.
//!
//! One method per robot command plus read accessors over the telemetry
//! cache.  Correlated commands return a [`CommandOutcome`]; motion, speech
//! and media commands are fire-and-forget.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), temi_types::TemiError> {
//! use std::sync::Arc;
//! use temi_adapter::{AdapterConfig, Robot};
//! use temi_middleware::EventBus;
//!
//! let bus = EventBus::default();
//! let robot = Robot::connect(Arc::new(bus), &AdapterConfig::for_serial("00119260058")).await?;
//! if robot.go_to_location("kitchen").await.is_success() {
//!     robot.speak("On my way").await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::select_all;
use serde_json::{Map, Value, json};
use temi_middleware::Transport;
use temi_types::{
    BatteryStatus, COORDINATES, CommandOutcome, HOME_BASE, NavGoal, NavStatus, Pose, RobotState,
    TemiError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::TelemetryCache;
use crate::config::AdapterConfig;
use crate::correlation::CorrelationTable;
use crate::dispatcher::CommandDispatcher;
use crate::router::TelemetryRouter;
use crate::topics::{Command, Namespace};

/// Adapter for a single temi robot.
///
/// Dropping the robot stops telemetry delivery.
pub struct Robot {
    cache: Arc<TelemetryCache>,
    dispatcher: CommandDispatcher,
    default_tilt_angle: f64,
    delivery: JoinHandle<()>,
}

impl Robot {
    /// Subscribe to the robot's namespace and start routing its telemetry.
    ///
    /// With `prime_on_connect` set, battery and position are queried before
    /// returning; their outcomes are logged, not returned.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: &AdapterConfig,
    ) -> Result<Self, TemiError> {
        config
            .validate()
            .map_err(|e| TemiError::Config(e.to_string()))?;

        let namespace = Namespace::new(config.serial.clone());
        let cache = Arc::new(TelemetryCache::new());
        let table = CorrelationTable::new();

        let mut streams = Vec::new();
        for (filter, qos) in namespace.subscriptions() {
            streams.push(transport.subscribe(&filter, qos).await?);
        }
        let router = TelemetryRouter::new(namespace.clone(), Arc::clone(&cache), table.clone());
        let delivery = tokio::spawn(router.run(select_all(streams).boxed()));

        info!(serial = namespace.serial(), "robot connected");

        let robot = Self {
            cache,
            dispatcher: CommandDispatcher::new(transport, namespace, table, config.wait_policy()),
            default_tilt_angle: config.default_tilt_angle,
            delivery,
        };

        if config.prime_on_connect {
            let battery = robot.get_battery_data().await;
            let position = robot.get_current_position().await;
            debug!(?battery, ?position, "initial state queried");
        }

        Ok(robot)
    }

    pub fn serial(&self) -> &str {
        self.dispatcher.namespace().serial()
    }

    // ── Correlated commands ──────────────────────────────────────────────

    pub async fn stop(&self) -> CommandOutcome {
        self.dispatcher.issue(Command::Stop, Map::new()).await
    }

    /// Navigate to a saved waypoint.
    ///
    /// The cached goal becomes `{location, Start}` before the command is
    /// published and stays that way whatever the outcome; later progress
    /// comes from goto events.
    pub async fn go_to_location(&self, location: &str) -> CommandOutcome {
        self.cache.mark_navigation_start(location);
        self.dispatcher
            .issue(Command::GoToLocation, fields([("location", json!(location))]))
            .await
    }

    /// Navigate to map coordinates.  The cached goal location reads
    /// `"COORDINATES"`.
    pub async fn go_to_position(&self, x: f64, y: f64, yaw: f64, tilt_angle: f64) -> CommandOutcome {
        self.cache.mark_navigation_start(COORDINATES);
        self.dispatcher
            .issue(
                Command::GoToPosition,
                fields([
                    ("x", json!(x)),
                    ("y", json!(y)),
                    ("yaw", json!(yaw)),
                    ("tiltAngle", json!(tilt_angle)),
                ]),
            )
            .await
    }

    /// [`go_to_position`](Self::go_to_position) with the configured default
    /// head tilt.
    pub async fn go_to_position_default_tilt(&self, x: f64, y: f64, yaw: f64) -> CommandOutcome {
        self.go_to_position(x, y, yaw, self.default_tilt_angle).await
    }

    /// Ask the robot to publish its battery state.  The reading itself
    /// arrives as telemetry.
    pub async fn get_battery_data(&self) -> CommandOutcome {
        self.dispatcher.issue(Command::BatteryData, Map::new()).await
    }

    pub async fn get_current_position(&self) -> CommandOutcome {
        self.dispatcher
            .issue(Command::CurrentPosition, Map::new())
            .await
    }

    /// Load `map_name` and localise at the given pose.
    pub async fn load_map(
        &self,
        map_name: &str,
        x: f64,
        y: f64,
        yaw: f64,
        tilt_angle: f64,
    ) -> CommandOutcome {
        self.dispatcher
            .issue(
                Command::LoadMap,
                fields([
                    ("mapName", json!(map_name)),
                    ("x", json!(x)),
                    ("y", json!(y)),
                    ("yaw", json!(yaw)),
                    ("tiltAngle", json!(tilt_angle)),
                ]),
            )
            .await
    }

    pub async fn load_map_at_origin(&self, map_name: &str) -> CommandOutcome {
        self.load_map(map_name, 0.0, 0.0, 0.0, self.default_tilt_angle)
            .await
    }

    // ── Fire-and-forget commands ─────────────────────────────────────────

    /// Turn in place by `angle` degrees.  Zero publishes nothing.
    pub async fn rotate(&self, angle: f64) -> Result<(), TemiError> {
        if angle == 0.0 {
            return Ok(());
        }
        self.dispatcher
            .fire(Command::TurnBy, json!({ "angle": angle }))
            .await
    }

    pub async fn tilt(&self, angle: f64) -> Result<(), TemiError> {
        self.dispatcher
            .fire(Command::Tilt, json!({ "angle": angle }))
            .await
    }

    pub async fn joystick(&self, x: f64, y: f64) -> Result<(), TemiError> {
        self.dispatcher
            .fire(Command::Joystick, json!({ "x": x, "y": y }))
            .await
    }

    pub async fn follow(&self) -> Result<(), TemiError> {
        self.dispatcher.fire(Command::Follow, json!({})).await
    }

    pub async fn speak(&self, utterance: &str) -> Result<(), TemiError> {
        self.dispatcher
            .fire(Command::Tts, json!({ "utterance": utterance }))
            .await
    }

    pub async fn play_video(&self, url: &str) -> Result<(), TemiError> {
        self.dispatcher
            .fire(Command::Video, json!({ "url": url }))
            .await
    }

    pub async fn show_webview(&self, url: &str) -> Result<(), TemiError> {
        self.dispatcher
            .fire(Command::Webview, json!({ "url": url }))
            .await
    }

    // ── Cached state ─────────────────────────────────────────────────────

    pub fn state(&self) -> RobotState {
        self.cache.snapshot()
    }

    pub fn locations(&self) -> Vec<String> {
        self.cache.read(|s| s.locations.clone())
    }

    pub fn battery(&self) -> Option<BatteryStatus> {
        self.cache.read(|s| s.battery)
    }

    pub fn nav_goal(&self) -> NavGoal {
        self.cache.read(|s| s.nav_goal.clone())
    }

    pub fn nav_status(&self) -> NavStatus {
        self.cache.read(|s| s.nav_goal.status)
    }

    pub fn current_location(&self) -> String {
        self.cache.read(|s| s.nav_goal.location.clone())
    }

    pub fn pose(&self) -> Pose {
        self.cache.read(|s| s.pose)
    }

    /// Estimated seconds to the current goal.
    pub fn duration_to_destination(&self) -> f64 {
        self.cache.read(|s| s.duration_estimate.seconds)
    }

    pub fn last_detected_user(&self) -> Option<Value> {
        self.cache.read(|s| s.last_detected_user.clone())
    }

    pub fn navigation_completed(&self) -> bool {
        self.nav_status() == NavStatus::Complete
    }

    /// `true` once the robot has finished navigating to its home base.
    pub fn docking_completed(&self) -> bool {
        self.cache
            .read(|s| s.nav_goal.status == NavStatus::Complete && s.nav_goal.location == HOME_BASE)
    }

    /// Wait until the navigation status reported by the robot equals
    /// `target`.  Returns `false` if `timeout` elapses first.
    pub async fn wait_for_nav_status(&self, target: NavStatus, timeout: Duration) -> bool {
        let mut rx = self.cache.subscribe_nav();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|goal| goal.status == target)).await,
            Ok(Ok(_))
        )
    }

    /// Wait until navigation ends, successfully or not.  Returns the final
    /// status, or `None` if `timeout` elapses first.
    pub async fn wait_for_nav_settled(&self, timeout: Duration) -> Option<NavStatus> {
        let mut rx = self.cache.subscribe_nav();
        let settled = tokio::time::timeout(timeout, rx.wait_for(|goal| goal.status.is_terminal()))
            .await
            .ok()?
            .ok()?
            .status;
        Some(settled)
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.delivery.abort();
    }
}

/// Request fields from key/value pairs.
fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
