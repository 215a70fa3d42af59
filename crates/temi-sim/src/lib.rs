//! `temi-sim` – a temi robot that lives on the in-process bus.
//!
//! Lets the adapter run end to end in CI and demos with no robot and no
//! broker: [`SimTemi`] answers correlated commands and publishes telemetry
//! in the formats the robot firmware uses.

pub mod sim;

pub use sim::{SimHandle, SimTemi};
