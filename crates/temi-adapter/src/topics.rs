//! Topic naming for one robot.
//!
//! Every topic lives under `temi/<serial>/`.  Commands are published to
//! `command/<path>`, and correlated commands ask the robot to answer on
//! `responseTopic/<path>`.

use temi_types::QoS;

/// Root of every temi topic.
pub const ROOT: &str = "temi";

/// Every command the robot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Stop,
    GoToLocation,
    GoToPosition,
    BatteryData,
    CurrentPosition,
    LoadMap,
    TurnBy,
    Tilt,
    Joystick,
    Follow,
    Tts,
    Video,
    Webview,
}

impl Command {
    /// Path below `command/` (and `responseTopic/`).
    pub fn path(self) -> &'static str {
        match self {
            Command::Stop => "move/stop",
            Command::GoToLocation => "waypoint/goToLocation",
            Command::GoToPosition => "waypoint/goToPosition",
            Command::BatteryData => "getData/batteryData",
            Command::CurrentPosition => "getData/currentPosition",
            Command::LoadMap => "getData/loadMap",
            Command::TurnBy => "move/turn_by",
            Command::Tilt => "move/tilt",
            Command::Joystick => "move/joystick",
            Command::Follow => "follow/unconstrained",
            Command::Tts => "tts",
            Command::Video => "media/video",
            Command::Webview => "media/webview",
        }
    }

    /// `true` for request/response commands that carry a `requestId`.
    pub fn is_correlated(self) -> bool {
        matches!(
            self,
            Command::Stop
                | Command::GoToLocation
                | Command::GoToPosition
                | Command::BatteryData
                | Command::CurrentPosition
                | Command::LoadMap
        )
    }

    /// Delivery tier.  Losing a stop or navigation request leaves the robot
    /// in an undefined state; continuous motion corrects itself next tick.
    pub fn qos(self) -> QoS {
        match self {
            _ if self.is_correlated() => QoS::ExactlyOnce,
            Command::TurnBy | Command::Tilt | Command::Joystick => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        }
    }
}

/// Inbound topic suffix, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic<'a> {
    Info,
    Battery,
    CurrentPosition,
    DurationToDestination,
    Goto,
    UserDetection,
    TestConnection,
    /// `responseTopic/<path>`; carries the command path.
    Response(&'a str),
    Unknown(&'a str),
}

impl<'a> InboundTopic<'a> {
    pub fn parse(suffix: &'a str) -> Self {
        match suffix {
            "status/info" => InboundTopic::Info,
            "status/utils/battery" => InboundTopic::Battery,
            "status/utils/currentPosition" => InboundTopic::CurrentPosition,
            "status/utils/durationToDestination" => InboundTopic::DurationToDestination,
            "event/waypoint/goto" => InboundTopic::Goto,
            "event/user/detection" => InboundTopic::UserDetection,
            "event/test/testConnection" => InboundTopic::TestConnection,
            other => match other.strip_prefix("responseTopic/") {
                Some(path) if !path.is_empty() => InboundTopic::Response(path),
                _ => InboundTopic::Unknown(other),
            },
        }
    }
}

/// Topic builder bound to one robot serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    serial: String,
    prefix: String,
}

impl Namespace {
    pub fn new(serial: impl Into<String>) -> Self {
        let serial = serial.into();
        let prefix = format!("{ROOT}/{serial}/");
        Self { serial, prefix }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Full topic for `suffix`.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }

    pub fn command_topic(&self, command: Command) -> String {
        self.topic(&format!("command/{}", command.path()))
    }

    pub fn response_topic(&self, command: Command) -> String {
        self.topic(&format!("responseTopic/{}", command.path()))
    }

    /// Strip the namespace from a full topic.  `None` for foreign topics.
    pub fn strip<'t>(&self, topic: &'t str) -> Option<&'t str> {
        topic.strip_prefix(self.prefix.as_str())
    }

    /// Filters the adapter subscribes to, with their delivery tier.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        vec![
            (self.topic("status/#"), QoS::AtMostOnce),
            (self.topic("event/#"), QoS::AtLeastOnce),
            (self.topic("responseTopic/#"), QoS::ExactlyOnce),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_topics_follow_namespace() {
        let ns = Namespace::new("00119260058");
        assert_eq!(
            ns.command_topic(Command::GoToLocation),
            "temi/00119260058/command/waypoint/goToLocation"
        );
        assert_eq!(
            ns.response_topic(Command::Stop),
            "temi/00119260058/responseTopic/move/stop"
        );
        assert_eq!(ns.command_topic(Command::Tts), "temi/00119260058/command/tts");
    }

    #[test]
    fn qos_tiers() {
        assert_eq!(Command::Stop.qos(), QoS::ExactlyOnce);
        assert_eq!(Command::GoToPosition.qos(), QoS::ExactlyOnce);
        assert_eq!(Command::LoadMap.qos(), QoS::ExactlyOnce);
        assert_eq!(Command::Joystick.qos(), QoS::AtMostOnce);
        assert_eq!(Command::TurnBy.qos(), QoS::AtMostOnce);
        assert_eq!(Command::Tilt.qos(), QoS::AtMostOnce);
        assert_eq!(Command::Follow.qos(), QoS::AtLeastOnce);
        assert_eq!(Command::Webview.qos(), QoS::AtLeastOnce);
    }

    #[test]
    fn inbound_topics_are_classified() {
        assert_eq!(InboundTopic::parse("status/utils/battery"), InboundTopic::Battery);
        assert_eq!(
            InboundTopic::parse("responseTopic/move/stop"),
            InboundTopic::Response("move/stop")
        );
        assert_eq!(
            InboundTopic::parse("responseTopic/"),
            InboundTopic::Unknown("responseTopic/")
        );
        assert_eq!(
            InboundTopic::parse("status/utils/temperature"),
            InboundTopic::Unknown("status/utils/temperature")
        );
    }

    #[test]
    fn strip_rejects_other_robots() {
        let ns = Namespace::new("abc");
        assert_eq!(ns.strip("temi/abc/status/info"), Some("status/info"));
        assert_eq!(ns.strip("temi/abcd/status/info"), None);
        assert_eq!(ns.strip("temi/xyz/status/info"), None);
    }
}
