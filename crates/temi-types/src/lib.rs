use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label the robot uses for its charging dock.
pub const HOME_BASE: &str = "home base";

/// Location label recorded when navigating to raw coordinates.
pub const COORDINATES: &str = "COORDINATES";

/// Delivery guarantee requested from the bus transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QoS {
    /// Fire-and-forget; a lost message is corrected by the next tick.
    AtMostOnce,
    /// Delivered one or more times.
    AtLeastOnce,
    /// Delivered exactly once.
    ExactlyOnce,
}

impl QoS {
    /// Numeric level as used on the wire (0, 1, 2).
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Navigation progress reported by the robot on `event/waypoint/goto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavStatus {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "going")]
    Going,
    #[serde(rename = "calculating")]
    Calculating,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "abort")]
    Aborted,
    #[serde(rename = "obstacle detected")]
    ObstacleDetected,
}

impl NavStatus {
    /// The status string exactly as the robot sends it.
    pub fn as_str(&self) -> &'static str {
        match self {
            NavStatus::Start => "start",
            NavStatus::Going => "going",
            NavStatus::Calculating => "calculating",
            NavStatus::Complete => "complete",
            NavStatus::Aborted => "abort",
            NavStatus::ObstacleDetected => "obstacle detected",
        }
    }

    /// Parse a wire status string. Matching ignores ASCII case and
    /// surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Some(NavStatus::Start),
            "going" => Some(NavStatus::Going),
            "calculating" => Some(NavStatus::Calculating),
            "complete" => Some(NavStatus::Complete),
            "abort" => Some(NavStatus::Aborted),
            "obstacle detected" => Some(NavStatus::ObstacleDetected),
            _ => None,
        }
    }

    /// `true` once the robot has stopped pursuing the goal, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NavStatus::Complete | NavStatus::Aborted)
    }
}

impl std::fmt::Display for NavStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Battery snapshot decoded from `status/utils/battery`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge level as a fraction in `[0, 1]`.
    pub percentage: f64,
    pub is_charging: bool,
}

/// Current navigation target and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavGoal {
    pub location: String,
    pub status: NavStatus,
}

/// Robot pose in the active map frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    /// Head tilt in degrees.
    pub tilt_angle: f64,
}

/// Estimated time to reach the current navigation goal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DurationEstimate {
    pub seconds: f64,
}

/// Last-known robot state, assembled from telemetry.
///
/// Each field group is replaced as a whole by the handler for its
/// telemetry topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    /// Saved waypoints, in the order the robot reports them.
    pub locations: Vec<String>,
    /// `None` until the first battery report arrives.
    pub battery: Option<BatteryStatus>,
    pub nav_goal: NavGoal,
    pub pose: Pose,
    pub duration_estimate: DurationEstimate,
    /// Raw payload of the most recent user-detection event.
    pub last_detected_user: Option<serde_json::Value>,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            locations: vec![HOME_BASE.to_string()],
            battery: None,
            nav_goal: NavGoal {
                location: HOME_BASE.to_string(),
                status: NavStatus::Complete,
            },
            pose: Pose {
                x: 0.0,
                y: 0.0,
                yaw: 0.0,
                tilt_angle: 50.0,
            },
            duration_estimate: DurationEstimate::default(),
            last_detected_user: None,
        }
    }
}

/// Definite result of a correlated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The robot acknowledged the request.
    Success,
    /// No matching response arrived within the wait budget.
    TimedOut,
    /// The command never left the adapter.
    Failed { reason: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }

    /// Convert into a `Result`, naming `command` in the timeout error.
    pub fn into_result(self, command: &str) -> Result<(), TemiError> {
        match self {
            CommandOutcome::Success => Ok(()),
            CommandOutcome::TimedOut => Err(TemiError::CorrelationTimeout {
                command: command.to_string(),
            }),
            CommandOutcome::Failed { reason } => Err(TemiError::Transport(reason)),
        }
    }
}

/// Error type spanning the transport boundary, correlation and telemetry
/// decoding.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemiError {
    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("No response to {command}")]
    CorrelationTimeout { command: String },

    #[error("Malformed telemetry on {topic}: {reason}")]
    MalformedTelemetry { topic: String, reason: String },

    #[error("Unrecognised request id: {0}")]
    MismatchedCorrelation(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for TemiError {
    fn from(e: serde_json::Error) -> Self {
        TemiError::Serialization(e.to_string())
    }
}
