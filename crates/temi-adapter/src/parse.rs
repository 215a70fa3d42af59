//! Decoders for the robot's telemetry payloads.
//!
//! Most payloads are plain JSON.  Battery and position reports still carry
//! the robot SDK's `toString()` output (`BatteryData(level=85,
//! isCharging=true)`, `Position(x=1.0, y=2.0, yaw=0.5, tiltAngle=50)`), so
//! those two are token-split for compatibility with deployed firmware.  A
//! JSON object is preferred for position whenever the robot sends one.
//!
//! Every decoder returns a human-readable reason on failure; the router
//! wraps it into [`TemiError::MalformedTelemetry`][temi_types::TemiError].

use serde::Deserialize;
use temi_types::{BatteryStatus, DurationEstimate, NavGoal, NavStatus, Pose};

/// Token positions of x, y, yaw and tiltAngle in a split legacy position.
const POSE_TOKEN_OFFSETS: [usize; 4] = [1, 4, 7, 10];

#[derive(Deserialize)]
struct BatteryPayload {
    #[serde(rename = "batteryData")]
    battery_data: String,
}

#[derive(Deserialize)]
struct PosePayload {
    x: f64,
    y: f64,
    yaw: f64,
    #[serde(rename = "tiltAngle")]
    tilt_angle: f64,
}

#[derive(Deserialize)]
struct GotoPayload {
    location: String,
    status: String,
}

#[derive(Deserialize)]
struct DurationPayload {
    duration: f64,
}

#[derive(Deserialize)]
struct InfoPayload {
    waypoint_list: Vec<String>,
}

#[derive(Deserialize)]
struct ResponsePayload {
    #[serde(rename = "requestId")]
    request_id: String,
}

fn json<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, String> {
    serde_json::from_slice(payload).map_err(|e| e.to_string())
}

/// `{"batteryData": "BatteryData(level=85, isCharging=true)"}`.
///
/// The level is the first numeric token; the charging flag is the
/// second-to-last token after splitting on `= , ( )` and spaces.
pub fn battery(payload: &[u8]) -> Result<BatteryStatus, String> {
    let BatteryPayload { battery_data } = json(payload)?;
    let tokens: Vec<&str> = battery_data
        .split(|c| matches!(c, '=' | ' ' | ',' | '(' | ')'))
        .collect();

    let level = tokens
        .iter()
        .filter_map(|t| t.parse::<f64>().ok())
        .find(|v| v.is_finite())
        .ok_or_else(|| format!("no battery level in '{battery_data}'"))?;
    let percentage = level / 100.0;
    if !(0.0..=1.0).contains(&percentage) {
        return Err(format!("battery level {level} out of range"));
    }

    let flag = tokens
        .len()
        .checked_sub(2)
        .and_then(|i| tokens.get(i))
        .copied()
        .ok_or_else(|| format!("no charging flag in '{battery_data}'"))?;
    let is_charging = match flag.to_ascii_lowercase().as_str() {
        "true" => true,
        "false" => false,
        other => return Err(format!("charging flag '{other}' is not a boolean")),
    };

    Ok(BatteryStatus {
        percentage,
        is_charging,
    })
}

/// Current position: a JSON object `{x, y, yaw, tiltAngle}`, or the legacy
/// token stream (bare or wrapped in a JSON string).
pub fn pose(payload: &[u8]) -> Result<Pose, String> {
    if let Ok(p) = serde_json::from_slice::<PosePayload>(payload) {
        return Ok(Pose {
            x: p.x,
            y: p.y,
            yaw: p.yaw,
            tilt_angle: p.tilt_angle,
        });
    }

    let raw = std::str::from_utf8(payload).map_err(|e| e.to_string())?;
    let text = serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string());
    let tokens: Vec<&str> = text
        .split(|c| matches!(c, '=' | ' ' | ',' | ')'))
        .collect();

    let mut values = [0.0f64; 4];
    for (value, offset) in values.iter_mut().zip(POSE_TOKEN_OFFSETS) {
        let token = tokens
            .get(offset)
            .ok_or_else(|| format!("position '{text}' has only {} tokens", tokens.len()))?;
        *value = token
            .parse()
            .map_err(|_| format!("position token '{token}' is not a number"))?;
    }
    let [x, y, yaw, tilt_angle] = values;
    Ok(Pose {
        x,
        y,
        yaw,
        tilt_angle,
    })
}

/// `{"location": "sofa", "status": "going"}`.
pub fn nav_goal(payload: &[u8]) -> Result<NavGoal, String> {
    let GotoPayload { location, status } = json(payload)?;
    let status =
        NavStatus::parse(&status).ok_or_else(|| format!("unknown navigation status '{status}'"))?;
    Ok(NavGoal { location, status })
}

/// `{"duration": 12.5}`.
pub fn duration(payload: &[u8]) -> Result<DurationEstimate, String> {
    let DurationPayload { duration } = json(payload)?;
    if !duration.is_finite() {
        return Err(format!("duration {duration} is not finite"));
    }
    Ok(DurationEstimate { seconds: duration })
}

/// `{"waypoint_list": ["home base", "sofa"]}`.
pub fn waypoints(payload: &[u8]) -> Result<Vec<String>, String> {
    json::<InfoPayload>(payload).map(|p| p.waypoint_list)
}

/// Any JSON value; user detection is stored as-is.
pub fn user(payload: &[u8]) -> Result<serde_json::Value, String> {
    json(payload)
}

/// `requestId` of a command response.
pub fn response_request_id(payload: &[u8]) -> Result<String, String> {
    json::<ResponsePayload>(payload).map(|p| p.request_id)
}
