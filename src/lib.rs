//! Low-latency market-data pipeline core plus PostgreSQL-to-Redis CDC
//! fan-out.
//!
//! Two halves sharing a process and a dependency stack but not a runtime
//! path: the hot path (`clock`, `interner`, `ring`, `flusher`,
//! `transport`, `journal`, `publisher`) runs with no PostgreSQL or Redis
//! in the loop, and the CDC path (`wal`, `cdc`, `cache`) runs with no
//! ring buffer in the loop. `main.rs` wires each into its own
//! subcommand.

pub mod cache;
pub mod cdc;
pub mod clock;
pub mod config;
pub mod error;
pub mod flusher;
pub mod interner;
pub mod journal;
pub mod metrics;
pub mod publisher;
pub mod ring;
pub mod transport;
pub mod wal;

pub use error::{Error, Result};
