//! Process-wide, concurrent, insert-only string interner.
//!
//! Wraps `lasso::ThreadedRodeo` to give every hot-path component a way to
//! turn repeated strings (subjects, feed names, header keys) into a small
//! `Copy` handle without taking a lock on the read path. The set of
//! interned strings only grows; handles are stable for the life of the
//! process.

use lasso::{Spur, ThreadedRodeo};
use std::sync::OnceLock;

pub use lasso::Spur as Handle;

static INTERNER: OnceLock<ThreadedRodeo<Spur>> = OnceLock::new();

fn rodeo() -> &'static ThreadedRodeo<Spur> {
    INTERNER.get_or_init(ThreadedRodeo::new)
}

/// Idempotent: equal strings yield equal handles, safe to call from any
/// thread without locking on the read path.
#[inline]
pub fn intern(s: &str) -> Handle {
    rodeo().get_or_intern(s)
}

/// Returns a reference whose lifetime is the process lifetime — the
/// interner never evicts or reuses a handle.
#[inline]
pub fn resolve(handle: Handle) -> &'static str {
    rodeo().resolve(&handle)
}
