//! Node runtimes: one single-threaded task per node role.
//!
//! - `collector`: the root/monitor task (node table, eviction, reports).
//! - `reporter`: the leaf task (periodic reports, buffering, flush on ack).
//!
//! Each runtime owns its state outright; the only way in is the socket and
//! the only scheduling primitive is a poll with a timer deadline.

pub mod collector;
pub mod reporter;

pub use collector::{Collector, CollectorConfig, CollectorError, CollectorHandle};
pub use reporter::{Reporter, ReporterConfig, ReporterError, ReporterHandle};
