//! [`CommandDispatcher`] – publishes commands and waits for their answers.
//!
//! A correlated command goes out as
//!
//! ```json
//! {"requestId": "…", "responseTopic": "temi/<serial>/responseTopic/<path>",
//!  "timestamp": "2024-05-01 14:03:12", …command fields…}
//! ```
//!
//! and the call parks on its [`CorrelationTable`] entry until the router
//! sees a response carrying the same `requestId`, or the [`WaitPolicy`]
//! budget runs out.  Transport failures never escape as errors; they become
//! [`CommandOutcome::Failed`].

use std::sync::Arc;

use chrono::Local;
use serde_json::{Map, Value};
use temi_middleware::Transport;
use temi_types::{CommandOutcome, TemiError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::correlation::{CorrelationTable, WaitOutcome, WaitPolicy};
use crate::topics::{Command, Namespace};

/// Format of the `timestamp` field in request envelopes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds, publishes and correlates robot commands.
pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    namespace: Namespace,
    table: CorrelationTable,
    policy: WaitPolicy,
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        namespace: Namespace,
        table: CorrelationTable,
        policy: WaitPolicy,
    ) -> Self {
        Self {
            transport,
            namespace,
            table,
            policy,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Publish a correlated command and wait for the robot to acknowledge it.
    pub async fn issue(&self, command: Command, fields: Map<String, Value>) -> CommandOutcome {
        let request_id = Uuid::new_v4();
        let response_topic = self.namespace.response_topic(command);
        let envelope = request_envelope(request_id, &response_topic, fields);

        let payload = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = TemiError::from(e);
                warn!(command = command.path(), error = %err, "request not encoded");
                return CommandOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        // Registered before publishing so an instant reply cannot be missed.
        let handle = self.table.register(request_id, command.path());

        let topic = self.namespace.command_topic(command);
        if let Err(err) = self.transport.publish(&topic, payload, command.qos()).await {
            warn!(command = command.path(), %request_id, error = %err, "publish failed");
            return CommandOutcome::Failed {
                reason: err.to_string(),
            };
        }
        info!(command = command.path(), %request_id, "request published");

        match handle.wait(self.policy).await {
            WaitOutcome::Resolved => {
                info!(command = command.path(), %request_id, "response received");
                CommandOutcome::Success
            }
            WaitOutcome::TimedOut => {
                let err = TemiError::CorrelationTimeout {
                    command: command.path().to_string(),
                };
                warn!(
                    %request_id,
                    budget_ms = self.policy.budget().as_millis() as u64,
                    error = %err,
                    "response not received"
                );
                CommandOutcome::TimedOut
            }
        }
    }

    /// Publish an uncorrelated command.  Nothing is awaited.
    pub async fn fire(&self, command: Command, payload: Value) -> Result<(), TemiError> {
        let bytes = serde_json::to_vec(&payload)?;
        let topic = self.namespace.command_topic(command);
        self.transport
            .publish(&topic, bytes, command.qos())
            .await
            .inspect_err(|err| warn!(command = command.path(), error = %err, "publish failed"))
    }
}

fn request_envelope(request_id: Uuid, response_topic: &str, mut fields: Map<String, Value>) -> Value {
    fields.insert("requestId".into(), Value::String(request_id.to_string()));
    fields.insert("responseTopic".into(), Value::String(response_topic.to_string()));
    fields.insert(
        "timestamp".into(),
        Value::String(Local::now().format(TIMESTAMP_FORMAT).to_string()),
    );
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream::{self, BoxStream};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use temi_middleware::InboundMessage;
    use temi_types::QoS;

    /// Transport that records publishes and optionally answers correlated
    /// requests straight into the table.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, Value, QoS)>>,
        answer: Option<CorrelationTable>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), TemiError> {
            if self.fail {
                return Err(TemiError::Transport("broker unreachable".into()));
            }
            let body: Value = serde_json::from_slice(&payload)?;
            if let Some(table) = &self.answer
                && let Some(id) = body["requestId"].as_str()
            {
                table.resolve(&Uuid::parse_str(id).map_err(|e| TemiError::Serialization(e.to_string()))?);
            }
            self.sent.lock().push((topic.to_string(), body, qos));
            Ok(())
        }

        async fn subscribe(
            &self,
            _filter: &str,
            _qos: QoS,
        ) -> Result<BoxStream<'static, InboundMessage>, TemiError> {
            Ok(Box::pin(stream::empty()))
        }
    }

    fn dispatcher(transport: Arc<RecordingTransport>, table: CorrelationTable) -> CommandDispatcher {
        CommandDispatcher::new(
            transport,
            Namespace::new("T1"),
            table,
            WaitPolicy::new(Duration::from_millis(10), 3),
        )
    }

    #[tokio::test]
    async fn issue_builds_envelope_and_succeeds_on_answer() {
        let table = CorrelationTable::new();
        let transport = Arc::new(RecordingTransport {
            answer: Some(table.clone()),
            ..Default::default()
        });
        let d = dispatcher(Arc::clone(&transport), table.clone());

        let mut fields = Map::new();
        fields.insert("location".into(), json!("sofa"));
        let outcome = d.issue(Command::GoToLocation, fields).await;
        assert_eq!(outcome, CommandOutcome::Success);

        let sent = transport.sent.lock();
        let (topic, body, qos) = &sent[0];
        assert_eq!(topic, "temi/T1/command/waypoint/goToLocation");
        assert_eq!(*qos, QoS::ExactlyOnce);
        assert_eq!(body["location"], "sofa");
        assert_eq!(body["responseTopic"], "temi/T1/responseTopic/waypoint/goToLocation");
        assert!(Uuid::parse_str(body["requestId"].as_str().unwrap()).is_ok());
        let ts = body["timestamp"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_ok());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn issue_times_out_without_answer() {
        let table = CorrelationTable::new();
        let transport = Arc::new(RecordingTransport::default());
        let d = dispatcher(transport, table.clone());

        assert_eq!(d.issue(Command::Stop, Map::new()).await, CommandOutcome::TimedOut);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_failed_outcome() {
        let table = CorrelationTable::new();
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let d = dispatcher(transport, table.clone());

        let outcome = d.issue(Command::Stop, Map::new()).await;
        assert!(matches!(outcome, CommandOutcome::Failed { reason } if reason.contains("broker unreachable")));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn fire_uses_command_qos_and_raw_payload() -> Result<(), Box<dyn std::error::Error>> {
        let transport = Arc::new(RecordingTransport::default());
        let d = dispatcher(Arc::clone(&transport), CorrelationTable::new());

        d.fire(Command::Joystick, json!({"x": 0.5, "y": -0.5})).await?;

        let sent = transport.sent.lock();
        assert_eq!(sent[0].0, "temi/T1/command/move/joystick");
        assert_eq!(sent[0].1, json!({"x": 0.5, "y": -0.5}));
        assert_eq!(sent[0].2, QoS::AtMostOnce);
        Ok(())
    }
}
