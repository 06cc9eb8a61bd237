//! PostgreSQL logical-replication WAL reading (§4.9, §4.10).

pub mod lsn;
pub mod reader;

pub use lsn::Lsn;
pub use reader::WalReader;
