//! Process-wide TSC clock.
//!
//! A fast, non-suspending monotonic counter for hot-path timestamps. The
//! reading is opaque to every consumer except the disk flusher, which is
//! the only place a wall-clock conversion happens (§4.6.2: the wall-clock
//! syscall happens once per disk write, not once per message).
//!
//! The value is NOT portable across hosts or processes and carries no
//! calendar meaning on its own — callers must not persist it and later
//! interpret it as wall-clock time.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(all(target_arch = "x86_64", not(miri)))]
#[inline(always)]
fn read_hw_counter() -> u64 {
    // SAFETY: RDTSC is available on every x86_64 target we run on and takes
    // no arguments; it never traps.
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(not(all(target_arch = "x86_64", not(miri))))]
#[inline(always)]
fn read_hw_counter() -> u64 {
    // Non-x86_64 hosts (and miri, which can't execute `rdtsc`) fall back to
    // a monotonic nanosecond counter. It's slower than a bare TSC read but
    // keeps the monotonicity contract and still avoids a wall-clock syscall.
    use std::time::Instant;
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Process-wide monotonic clock handle.
///
/// Cloning is cheap (no internal state besides a marker); every clone reads
/// the same underlying hardware counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TscClock;

impl TscClock {
    pub const fn new() -> Self {
        TscClock
    }

    /// Fast, non-suspending monotonic reading. MUST NOT perform a syscall.
    #[inline(always)]
    pub fn now_tsc(&self) -> u64 {
        read_hw_counter()
    }
}

/// Monotonic sequence counter shared across a transport or journal
/// instance. `Relaxed` is sufficient: ordering between the sequence and the
/// payload bytes is provided by the channel the sequence rides on, not by
/// the counter itself (see spec §5).
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub const fn new() -> Self {
        SequenceCounter(AtomicU64::new(0))
    }

    #[inline(always)]
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
