//! PostgreSQL-to-Redis change-data-capture fan-out (§3.4, §4.11-§4.13).

pub mod consumer;
pub mod event;
pub mod publisher;
pub mod warmer;

pub use consumer::CdcConsumer;
pub use event::{CdcEvent, Op};
pub use publisher::CdcPublisher;
pub use warmer::{CacheWarmer, WarmTable};
