//! [`TelemetryRouter`] – dispatches inbound messages by topic.
//!
//! Every message the adapter receives lands here.  Telemetry updates the
//! [`TelemetryCache`]; responses resolve a [`CorrelationTable`] entry.  A
//! payload that fails to decode is logged and dropped, leaving the cache at
//! its previous value; nothing is ever propagated back into the transport.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use temi_middleware::InboundMessage;
use temi_types::TemiError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{TelemetryCache, TelemetryKind};
use crate::correlation::CorrelationTable;
use crate::parse;
use crate::topics::{InboundTopic, Namespace};

/// What routing a message did.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    CacheUpdated(TelemetryKind),
    /// A response woke the request with this ID.
    Resolved(Uuid),
    /// A response carried an ID nobody is waiting for.
    Unmatched(String),
    /// Not for us, or nothing to do.
    Ignored,
    /// The payload could not be decoded.
    Dropped(TemiError),
}

/// Routes inbound messages of one robot.  Clones share cache and table.
#[derive(Clone)]
pub struct TelemetryRouter {
    namespace: Namespace,
    cache: Arc<TelemetryCache>,
    table: CorrelationTable,
}

impl TelemetryRouter {
    pub fn new(namespace: Namespace, cache: Arc<TelemetryCache>, table: CorrelationTable) -> Self {
        Self {
            namespace,
            cache,
            table,
        }
    }

    /// Route a message addressed by its namespace-relative `suffix`.
    pub fn route(&self, suffix: &str, payload: &[u8]) -> RouteOutcome {
        let cache = &self.cache;
        let updated = match InboundTopic::parse(suffix) {
            InboundTopic::Info => parse::waypoints(payload).map(|list| {
                cache.set_locations(list);
                TelemetryKind::Locations
            }),
            InboundTopic::Battery => parse::battery(payload).map(|battery| {
                cache.set_battery(battery);
                TelemetryKind::Battery
            }),
            InboundTopic::CurrentPosition => parse::pose(payload).map(|pose| {
                cache.set_pose(pose);
                TelemetryKind::Pose
            }),
            InboundTopic::DurationToDestination => parse::duration(payload).map(|d| {
                cache.set_duration(d);
                TelemetryKind::Duration
            }),
            InboundTopic::Goto => parse::nav_goal(payload).map(|goal| {
                debug!(location = %goal.location, status = %goal.status, "navigation event");
                cache.set_nav_goal(goal);
                TelemetryKind::NavGoal
            }),
            InboundTopic::UserDetection => parse::user(payload).map(|user| {
                debug!(%user, "user detected");
                cache.set_detected_user(user);
                TelemetryKind::User
            }),
            InboundTopic::Response(path) => return self.resolve_response(suffix, path, payload),
            InboundTopic::TestConnection => return RouteOutcome::Ignored,
            InboundTopic::Unknown(other) => {
                debug!(topic = other, "no handler for topic");
                return RouteOutcome::Ignored;
            }
        };

        match updated {
            Ok(kind) => RouteOutcome::CacheUpdated(kind),
            Err(reason) => dropped(suffix, reason),
        }
    }

    /// Route a message carrying a full topic.  Other robots' traffic is
    /// ignored.
    pub fn route_message(&self, message: &InboundMessage) -> RouteOutcome {
        match self.namespace.strip(&message.topic) {
            Some(suffix) => self.route(suffix, &message.payload),
            None => RouteOutcome::Ignored,
        }
    }

    /// Delivery loop: route every message until the stream ends.
    pub async fn run(self, mut messages: BoxStream<'static, InboundMessage>) {
        while let Some(message) = messages.next().await {
            self.route_message(&message);
        }
        debug!(serial = self.namespace.serial(), "inbound stream closed");
    }

    fn resolve_response(&self, suffix: &str, path: &str, payload: &[u8]) -> RouteOutcome {
        let raw_id = match parse::response_request_id(payload) {
            Ok(id) => id,
            Err(reason) => return dropped(suffix, reason),
        };
        match Uuid::parse_str(&raw_id) {
            Ok(id) if self.table.resolve(&id) => RouteOutcome::Resolved(id),
            _ => {
                let err = TemiError::MismatchedCorrelation(raw_id.clone());
                debug!(command = path, error = %err, "ignoring response");
                RouteOutcome::Unmatched(raw_id)
            }
        }
    }
}

fn dropped(suffix: &str, reason: String) -> RouteOutcome {
    let err = TemiError::MalformedTelemetry {
        topic: suffix.to_string(),
        reason,
    };
    warn!(error = %err, "dropping telemetry");
    RouteOutcome::Dropped(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::WaitPolicy;
    use std::time::Duration;
    use temi_types::{NavStatus, QoS};

    fn router() -> (TelemetryRouter, Arc<TelemetryCache>, CorrelationTable) {
        let cache = Arc::new(TelemetryCache::new());
        let table = CorrelationTable::new();
        let router = TelemetryRouter::new(Namespace::new("R2"), Arc::clone(&cache), table.clone());
        (router, cache, table)
    }

    #[test]
    fn duration_scenario() {
        let (router, cache, _) = router();
        let outcome = router.route("status/utils/durationToDestination", br#"{"duration": 12.5}"#);
        assert_eq!(outcome, RouteOutcome::CacheUpdated(TelemetryKind::Duration));
        assert!((cache.snapshot().duration_estimate.seconds - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn battery_and_pose_are_cached() {
        let (router, cache, _) = router();
        router.route(
            "status/utils/battery",
            br#"{"batteryData": "BatteryData(level=64, isCharging=false)"}"#,
        );
        router.route(
            "status/utils/currentPosition",
            b"Position(x=1.0, y=2.0, yaw=0.25, tiltAngle=30)",
        );
        let state = cache.snapshot();
        let battery = state.battery.unwrap();
        assert!((battery.percentage - 0.64).abs() < 1e-9);
        assert!(!battery.is_charging);
        assert!((state.pose.yaw - 0.25).abs() < 1e-9);
        assert!((state.pose.tilt_angle - 30.0).abs() < 1e-9);
    }

    #[test]
    fn waypoints_goto_and_user_are_cached() {
        let (router, cache, _) = router();
        router.route("status/info", br#"{"waypoint_list": ["home base", "sofa", "kitchen"]}"#);
        router.route("event/waypoint/goto", br#"{"location": "kitchen", "status": "going"}"#);
        router.route("event/user/detection", br#"{"name": "Ada", "distance": 1.2}"#);

        let state = cache.snapshot();
        assert_eq!(state.locations, vec!["home base", "sofa", "kitchen"]);
        assert_eq!(state.nav_goal.location, "kitchen");
        assert_eq!(state.nav_goal.status, NavStatus::Going);
        assert_eq!(state.last_detected_user.unwrap()["name"], "Ada");
    }

    #[test]
    fn malformed_payload_is_dropped_and_cache_kept() {
        let (router, cache, _) = router();
        router.route("status/utils/durationToDestination", br#"{"duration": 3.0}"#);

        let outcome = router.route("status/utils/durationToDestination", b"{oops");
        assert!(matches!(outcome, RouteOutcome::Dropped(TemiError::MalformedTelemetry { .. })));
        assert!((cache.snapshot().duration_estimate.seconds - 3.0).abs() < f64::EPSILON);

        let outcome = router.route("event/waypoint/goto", br#"{"location": "sofa", "status": "??"}"#);
        assert!(matches!(outcome, RouteOutcome::Dropped(_)));
        assert_eq!(cache.snapshot().nav_goal.location, "home base");
    }

    #[tokio::test]
    async fn response_resolves_matching_request_only() {
        let (router, _, table) = router();
        let id = Uuid::new_v4();
        let handle = table.register(id, "move/stop");

        let foreign = format!(r#"{{"requestId": "{}"}}"#, Uuid::new_v4());
        assert!(matches!(
            router.route("responseTopic/move/stop", foreign.as_bytes()),
            RouteOutcome::Unmatched(_)
        ));
        assert!(table.contains(&id));

        let garbage = br#"{"requestId": "not-a-uuid"}"#;
        assert_eq!(
            router.route("responseTopic/move/stop", garbage),
            RouteOutcome::Unmatched("not-a-uuid".into())
        );

        let mine = format!(r#"{{"requestId": "{id}", "status": "OK"}}"#);
        assert_eq!(
            router.route("responseTopic/move/stop", mine.as_bytes()),
            RouteOutcome::Resolved(id)
        );
        // Duplicate delivery of the same response is harmless.
        assert!(matches!(
            router.route("responseTopic/move/stop", mine.as_bytes()),
            RouteOutcome::Unmatched(_)
        ));

        let outcome = handle
            .wait(WaitPolicy::new(Duration::from_millis(10), 1))
            .await;
        assert_eq!(outcome, crate::correlation::WaitOutcome::Resolved);
    }

    #[test]
    fn response_without_request_id_is_dropped() {
        let (router, _, _) = router();
        assert!(matches!(
            router.route("responseTopic/move/stop", br#"{"status": "OK"}"#),
            RouteOutcome::Dropped(_)
        ));
    }

    #[test]
    fn foreign_and_unknown_topics_are_ignored() {
        let (router, _, _) = router();
        let other_robot = InboundMessage::new("temi/R3/status/info", r#"{"waypoint_list": []}"#, QoS::AtMostOnce);
        assert_eq!(router.route_message(&other_robot), RouteOutcome::Ignored);
        assert_eq!(router.route("status/utils/temperature", b"{}"), RouteOutcome::Ignored);
        assert_eq!(router.route("event/test/testConnection", b"ping"), RouteOutcome::Ignored);
    }

    #[tokio::test]
    async fn run_drains_stream() {
        let (router, cache, _) = router();
        let messages = vec![
            InboundMessage::new("temi/R2/status/info", r#"{"waypoint_list": ["a"]}"#, QoS::AtMostOnce),
            InboundMessage::new("temi/R2/status/utils/battery", "garbage", QoS::AtMostOnce),
            InboundMessage::new("temi/R2/status/utils/durationToDestination", r#"{"duration": 1.5}"#, QoS::AtMostOnce),
        ];
        router.run(futures_util::stream::iter(messages).boxed()).await;

        let state = cache.snapshot();
        assert_eq!(state.locations, vec!["a"]);
        assert!(state.battery.is_none());
        assert!((state.duration_estimate.seconds - 1.5).abs() < f64::EPSILON);
    }
}
