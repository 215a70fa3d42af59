//! Simulated temi device for headless testing.
//!
//! [`SimTemi`] listens on `temi/<serial>/command/#` of an in-process
//! [`EventBus`], answers correlated commands on the `responseTopic` they
//! name, and publishes the telemetry a real robot would: battery and
//! position in the SDK's legacy string formats, goto progress events during
//! navigation, and the waypoint list.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use temi_middleware::EventBus;
//! use temi_sim::SimTemi;
//!
//! # async fn demo() {
//! let bus = EventBus::default();
//! let sim = SimTemi::new("00119260058")
//!     .with_waypoints(["home base", "kitchen"])
//!     .with_response_delay(Duration::from_millis(50))
//!     .spawn(&bus);
//! // ... connect a robot to `bus` and drive it ...
//! assert!(sim.received_on("waypoint/goToLocation").is_empty());
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use temi_middleware::{EventBus, InboundMessage};
use temi_types::{BatteryStatus, COORDINATES, HOME_BASE, NavStatus, Pose, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Builder for a simulated robot.
#[derive(Debug, Clone)]
pub struct SimTemi {
    serial: String,
    mute_all: bool,
    silent_paths: HashSet<String>,
    response_delay: Duration,
    nav_step: Duration,
    state: SimState,
}

#[derive(Debug, Clone)]
struct SimState {
    battery: BatteryStatus,
    pose: Pose,
    waypoints: Vec<String>,
}

impl SimTemi {
    /// A robot that answers everything immediately, sitting docked at 85 %.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            mute_all: false,
            silent_paths: HashSet::new(),
            response_delay: Duration::ZERO,
            nav_step: Duration::from_millis(100),
            state: SimState {
                battery: BatteryStatus {
                    percentage: 0.85,
                    is_charging: true,
                },
                pose: Pose {
                    x: 0.0,
                    y: 0.0,
                    yaw: 0.0,
                    tilt_angle: 50.0,
                },
                waypoints: vec![HOME_BASE.to_string()],
            },
        }
    }

    /// Never answer any command.  Telemetry is still published.
    pub fn silent(mut self) -> Self {
        self.mute_all = true;
        self
    }

    /// Never answer commands on `path` (e.g. `"move/stop"`).
    pub fn drop_responses_for(mut self, path: impl Into<String>) -> Self {
        self.silent_paths.insert(path.into());
        self
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// Time between navigation progress events.
    pub fn with_nav_step(mut self, step: Duration) -> Self {
        self.nav_step = step;
        self
    }

    pub fn with_battery(mut self, percentage: f64, is_charging: bool) -> Self {
        self.state.battery = BatteryStatus {
            percentage,
            is_charging,
        };
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.state.pose = pose;
        self
    }

    pub fn with_waypoints<I, S>(mut self, waypoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.waypoints = waypoints.into_iter().map(Into::into).collect();
        self
    }

    /// Start serving commands on `bus`.  The command subscription exists
    /// when this returns.
    pub fn spawn(self, bus: &EventBus) -> SimHandle {
        let prefix = format!("temi/{}/", self.serial);
        let mut commands = bus.subscribe_filter(format!("{prefix}command/#"));
        let device = Arc::new(Device {
            prefix,
            mute_all: self.mute_all,
            silent_paths: self.silent_paths,
            response_delay: self.response_delay,
            nav_step: self.nav_step,
            state: Mutex::new(self.state),
            received: Mutex::new(Vec::new()),
            bus: bus.clone(),
        });

        info!(serial = %self.serial, "simulated temi online");
        let worker = Arc::clone(&device);
        let task = tokio::spawn(async move {
            worker.publish_waypoints();
            while let Some(msg) = commands.recv().await {
                worker.handle(msg);
            }
        });

        SimHandle { device, task }
    }
}

struct Device {
    prefix: String,
    mute_all: bool,
    silent_paths: HashSet<String>,
    response_delay: Duration,
    nav_step: Duration,
    state: Mutex<SimState>,
    received: Mutex<Vec<InboundMessage>>,
    bus: EventBus,
}

impl Device {
    fn handle(self: &Arc<Self>, msg: InboundMessage) {
        let Some(path) = msg.topic.strip_prefix(&format!("{}command/", self.prefix)) else {
            return;
        };
        let path = path.to_string();
        let body: Value = serde_json::from_slice(&msg.payload).unwrap_or(Value::Null);
        debug!(command = %path, "sim received command");
        self.received.lock().push(msg);

        match path.as_str() {
            "getData/batteryData" => self.publish_battery(),
            "getData/currentPosition" => self.publish_position(),
            "getData/loadMap" => self.publish_waypoints(),
            "waypoint/goToLocation" => {
                let location = body["location"].as_str().unwrap_or_default().to_string();
                self.navigate(location, None);
            }
            "waypoint/goToPosition" => {
                let target = Pose {
                    x: body["x"].as_f64().unwrap_or_default(),
                    y: body["y"].as_f64().unwrap_or_default(),
                    yaw: body["yaw"].as_f64().unwrap_or_default(),
                    tilt_angle: body["tiltAngle"].as_f64().unwrap_or_default(),
                };
                self.navigate(COORDINATES.to_string(), Some(target));
            }
            _ => {}
        }

        self.respond(&path, &body);
    }

    fn respond(self: &Arc<Self>, path: &str, body: &Value) {
        let (Some(request_id), Some(topic)) =
            (body["requestId"].as_str(), body["responseTopic"].as_str())
        else {
            return;
        };
        if self.mute_all || self.silent_paths.contains(path) {
            debug!(command = path, request_id, "sim withholding response");
            return;
        }
        let payload = json!({ "requestId": request_id, "status": "OK" }).to_string();
        let topic = topic.to_string();
        let device = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(device.response_delay).await;
            device.publish_raw(&topic, payload, QoS::ExactlyOnce);
        });
    }

    fn navigate(self: &Arc<Self>, location: String, target: Option<Pose>) {
        let known = target.is_some() || self.state.lock().waypoints.contains(&location);
        let device = Arc::clone(self);
        tokio::spawn(async move {
            device.publish_goto(&location, NavStatus::Start);
            tokio::time::sleep(device.nav_step).await;
            if !known {
                device.publish_goto(&location, NavStatus::Aborted);
                return;
            }
            device.publish(
                "status/utils/durationToDestination",
                json!({ "duration": device.nav_step.as_secs_f64() }),
                QoS::AtMostOnce,
            );
            device.publish_goto(&location, NavStatus::Going);
            tokio::time::sleep(device.nav_step).await;
            if let Some(pose) = target {
                device.state.lock().pose = pose;
            }
            device.publish_goto(&location, NavStatus::Complete);
        });
    }

    fn publish_battery(&self) {
        let battery = self.state.lock().battery;
        let data = format!(
            "BatteryData(level={}, isCharging={})",
            (battery.percentage * 100.0).round(),
            battery.is_charging
        );
        self.publish(
            "status/utils/battery",
            json!({ "batteryData": data }),
            QoS::AtMostOnce,
        );
    }

    fn publish_position(&self) {
        let pose = self.state.lock().pose;
        let data = format!(
            "Position(x={}, y={}, yaw={}, tiltAngle={})",
            pose.x, pose.y, pose.yaw, pose.tilt_angle
        );
        self.publish("status/utils/currentPosition", Value::String(data), QoS::AtMostOnce);
    }

    fn publish_waypoints(&self) {
        let waypoints = self.state.lock().waypoints.clone();
        self.publish(
            "status/info",
            json!({ "waypoint_list": waypoints }),
            QoS::AtMostOnce,
        );
    }

    fn publish_goto(&self, location: &str, status: NavStatus) {
        self.publish(
            "event/waypoint/goto",
            json!({ "location": location, "status": status.as_str() }),
            QoS::AtLeastOnce,
        );
    }

    fn publish(&self, suffix: &str, payload: Value, qos: QoS) {
        let topic = format!("{}{suffix}", self.prefix);
        self.publish_raw(&topic, payload.to_string(), qos);
    }

    fn publish_raw(&self, topic: &str, payload: String, qos: QoS) {
        if let Err(e) = self.bus.publish(topic, payload, qos) {
            debug!(topic, error = %e, "sim telemetry not delivered");
        }
    }
}

/// A running simulated robot.  Dropping the handle takes it offline.
pub struct SimHandle {
    device: Arc<Device>,
    task: JoinHandle<()>,
}

impl SimHandle {
    /// Every command received so far, in arrival order.
    pub fn received(&self) -> Vec<InboundMessage> {
        self.device.received.lock().clone()
    }

    /// Decoded payloads of the commands received on `path`.
    pub fn received_on(&self, path: &str) -> Vec<Value> {
        let topic = format!("{}command/{path}", self.device.prefix);
        self.device
            .received
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Change the battery and report it.
    pub fn emit_battery(&self, percentage: f64, is_charging: bool) {
        self.device.state.lock().battery = BatteryStatus {
            percentage,
            is_charging,
        };
        self.device.publish_battery();
    }

    /// Replace the saved waypoints and report them.
    pub fn emit_waypoints<I, S>(&self, waypoints: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.device.state.lock().waypoints = waypoints.into_iter().map(Into::into).collect();
        self.device.publish_waypoints();
    }

    pub fn emit_goto(&self, location: &str, status: NavStatus) {
        self.device.publish_goto(location, status);
    }

    pub fn emit_user_detected(&self, user: Value) {
        self.device
            .publish("event/user/detection", user, QoS::AtLeastOnce);
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temi_adapter::{AdapterConfig, Robot};
    use temi_types::{CommandOutcome, TemiError};

    const SERIAL: &str = "00119260058";

    async fn robot(bus: &EventBus) -> Result<Robot, TemiError> {
        let config = AdapterConfig {
            prime_on_connect: false,
            ..AdapterConfig::for_serial(SERIAL)
        };
        Robot::connect(Arc::new(bus.clone()), &config).await
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn records_commands_and_answers_on_response_topic() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let sim = SimTemi::new(SERIAL).spawn(&bus);
        let mut responses = bus.subscribe_filter(format!("temi/{SERIAL}/responseTopic/#"));

        bus.publish(
            format!("temi/{SERIAL}/command/move/stop"),
            json!({
                "requestId": "abc",
                "responseTopic": format!("temi/{SERIAL}/responseTopic/move/stop"),
            })
            .to_string(),
            QoS::ExactlyOnce,
        )?;

        let answer = responses.recv().await.ok_or("no response")?;
        let body: Value = serde_json::from_slice(&answer.payload)?;
        assert_eq!(body["requestId"], "abc");
        assert_eq!(body["status"], "OK");
        assert_eq!(sim.received_on("move/stop").len(), 1);
        assert_eq!(sim.received().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn battery_query_updates_robot_cache() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let _sim = SimTemi::new(SERIAL).with_battery(0.42, false).spawn(&bus);
        let robot = robot(&bus).await?;

        assert_eq!(robot.get_battery_data().await, CommandOutcome::Success);
        settle().await;

        let battery = robot.battery().ok_or("battery not cached")?;
        assert!((battery.percentage - 0.42).abs() < 1e-9);
        assert!(!battery.is_charging);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_runs_to_completion() -> Result<(), TemiError> {
        let bus = EventBus::default();
        let sim = SimTemi::new(SERIAL)
            .with_waypoints(["home base", "kitchen"])
            .spawn(&bus);
        let robot = robot(&bus).await?;

        assert_eq!(robot.go_to_location("kitchen").await, CommandOutcome::Success);
        assert!(
            robot
                .wait_for_nav_status(NavStatus::Complete, Duration::from_secs(5))
                .await
        );
        assert_eq!(robot.current_location(), "kitchen");
        assert!(robot.navigation_completed());
        assert!(!robot.docking_completed());
        assert!((robot.duration_to_destination() - 0.1).abs() < 1e-9);
        assert_eq!(sim.received_on("waypoint/goToLocation")[0]["location"], "kitchen");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_location_aborts() -> Result<(), TemiError> {
        let bus = EventBus::default();
        let _sim = SimTemi::new(SERIAL).spawn(&bus);
        let robot = robot(&bus).await?;

        assert!(robot.go_to_location("moon").await.is_success());
        assert!(
            robot
                .wait_for_nav_status(NavStatus::Aborted, Duration::from_secs(5))
                .await
        );
        assert_eq!(robot.current_location(), "moon");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn returning_home_completes_docking() -> Result<(), TemiError> {
        let bus = EventBus::default();
        let _sim = SimTemi::new(SERIAL).spawn(&bus);
        let robot = robot(&bus).await?;

        assert!(robot.go_to_location(HOME_BASE).await.is_success());
        assert!(!robot.docking_completed());
        assert!(
            robot
                .wait_for_nav_status(NavStatus::Complete, Duration::from_secs(5))
                .await
        );
        assert!(robot.docking_completed());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_responses_time_out_others_succeed() -> Result<(), TemiError> {
        let bus = EventBus::default();
        let _sim = SimTemi::new(SERIAL)
            .drop_responses_for("move/stop")
            .spawn(&bus);
        let robot = robot(&bus).await?;

        let started = tokio::time::Instant::now();
        assert_eq!(robot.stop().await, CommandOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(2500));
        assert_eq!(robot.get_current_position().await, CommandOutcome::Success);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_concurrent_requests_resolve_independently() -> Result<(), TemiError> {
        let bus = EventBus::default();
        let _sim = SimTemi::new(SERIAL)
            .with_response_delay(Duration::from_millis(300))
            .spawn(&bus);
        let robot = robot(&bus).await?;

        let started = tokio::time::Instant::now();
        let (stop, battery, position) = tokio::join!(
            robot.stop(),
            robot.get_battery_data(),
            robot.get_current_position()
        );
        assert!(stop.is_success() && battery.is_success() && position.is_success());
        assert!(started.elapsed() < Duration::from_millis(500));
        Ok(())
    }

    #[tokio::test]
    async fn silent_robot_still_reports_telemetry() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let sim = SimTemi::new(SERIAL).silent().spawn(&bus);
        let robot = robot(&bus).await?;

        sim.emit_battery(0.5, true);
        sim.emit_user_detected(json!({ "name": "Ada" }));
        sim.emit_goto("sofa", NavStatus::ObstacleDetected);
        assert!(
            robot
                .wait_for_nav_status(NavStatus::ObstacleDetected, Duration::from_secs(1))
                .await
        );
        settle().await;

        assert!(robot.battery().ok_or("battery not cached")?.is_charging);
        assert_eq!(robot.last_detected_user().ok_or("user not cached")?["name"], "Ada");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn load_map_publishes_waypoints() -> Result<(), TemiError> {
        let bus = EventBus::default();
        let sim = SimTemi::new(SERIAL)
            .with_waypoints(["home base", "lobby", "lab"])
            .spawn(&bus);
        let robot = robot(&bus).await?;

        assert!(robot.load_map_at_origin("floor2").await.is_success());
        settle().await;
        assert_eq!(robot.locations(), vec!["home base", "lobby", "lab"]);

        sim.emit_waypoints(["home base"]);
        settle().await;
        assert_eq!(robot.locations(), vec!["home base"]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn position_navigation_moves_pose() -> Result<(), TemiError> {
        let bus = EventBus::default();
        let _sim = SimTemi::new(SERIAL).spawn(&bus);
        let robot = robot(&bus).await?;

        assert!(robot.go_to_position(1.5, -2.0, 0.75, 30.0).await.is_success());
        assert_eq!(robot.current_location(), COORDINATES);
        assert!(
            robot
                .wait_for_nav_status(NavStatus::Complete, Duration::from_secs(5))
                .await
        );
        assert!(robot.get_current_position().await.is_success());
        settle().await;

        let pose = robot.pose();
        assert!((pose.x - 1.5).abs() < 1e-9);
        assert!((pose.y + 2.0).abs() < 1e-9);
        assert!((pose.yaw - 0.75).abs() < 1e-9);
        assert!((pose.tilt_angle - 30.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn connect_primes_battery_and_position() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let _sim = SimTemi::new(SERIAL)
            .with_pose(Pose {
                x: 3.0,
                y: 4.0,
                yaw: 0.0,
                tilt_angle: 50.0,
            })
            .spawn(&bus);
        let robot = Robot::connect(Arc::new(bus.clone()), &AdapterConfig::for_serial(SERIAL)).await?;
        settle().await;

        assert!(robot.battery().is_some());
        assert!((robot.pose().x - 3.0).abs() < 1e-9);
        Ok(())
    }
}
