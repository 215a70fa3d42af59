//! `temi-adapter` – request/response correlation over a fire-and-forget bus.
//!
//! Bridges a message bus to one temi robot: telemetry is folded into a
//! cached [`RobotState`][temi_types::RobotState], and commands are issued as
//! correlated exchanges that end in a definite
//! [`CommandOutcome`][temi_types::CommandOutcome].
//!
//! # Modules
//!
//! - [`robot`] – [`Robot`][robot::Robot]: the facade.  One method per
//!   command and read accessors over the cache.
//! - [`dispatcher`] – [`CommandDispatcher`][dispatcher::CommandDispatcher]:
//!   builds request envelopes, publishes them and waits for the answer.
//! - [`correlation`] – [`CorrelationTable`][correlation::CorrelationTable]:
//!   outstanding request IDs and their wake-up notifiers, plus the
//!   [`WaitPolicy`][correlation::WaitPolicy] bounding every wait.
//! - [`router`] – [`TelemetryRouter`][router::TelemetryRouter]: routes
//!   inbound messages by topic and runs the delivery loop.
//! - [`cache`] – [`TelemetryCache`][cache::TelemetryCache]: the lock-guarded
//!   state with a watch channel for navigation progress.
//! - [`parse`] – payload decoders, including the legacy token formats.
//! - [`topics`] – `temi/<serial>/…` topic names and per-command QoS.
//! - [`config`] – `temi.toml` loading with `TEMI_*` overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the
//!   `tracing` subscriber with optional OTLP export.

pub mod cache;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod parse;
pub mod robot;
pub mod router;
pub mod telemetry;
pub mod topics;

pub use config::AdapterConfig;
pub use correlation::{CorrelationTable, WaitPolicy};
pub use robot::Robot;
pub use router::{RouteOutcome, TelemetryRouter};
pub use topics::{Command, Namespace};
