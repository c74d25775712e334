//! Mesh telemetry over UDP.
//!
//! Leaf nodes run a [`runtime::Reporter`] that periodically sends the node's
//! current state (preferred routing parent plus a sensor reading) to the
//! mesh root. The root runs a [`runtime::Collector`] that tracks which nodes
//! are alive in a bounded table, expires rows that stop reporting, and logs
//! a periodic report.

pub mod buffer;
pub mod net;
pub mod routing;
pub mod runtime;
pub mod sensor;
pub mod table;
pub mod tick;
pub mod trace;
pub mod wire;

pub use trace::init_tracing;
