//! Fixed-capacity, memory-mapped single-producer/single-consumer ring.
//!
//! Backed by a memory-mapped file sized exactly `slot_size * ring_slots`.
//! Each slot begins with an 8-byte header (`len: u32`, `flags: u32`)
//! followed by up to `slot_size - HEADER_SIZE` bytes of payload. Two
//! 64-bit atomic counters — `write_pos`, owned by the producer, and
//! `read_pos`, owned by the consumer — hand payload bytes off between
//! exactly one producer thread and exactly one consumer thread with no
//! internal locks.
//!
//! The memory-mapped file is transient storage: on process restart both
//! counters reset to 0 because `Ring::create` always truncates and
//! re-creates the backing file. There is no on-disk durability contract
//! here — that's the disk flusher's job, downstream of this ring.
//!
//! Single-owner enforcement: `Ring::create` never exposes `&Ring`
//! directly. It hands out a [`RingProducer`] and a [`RingConsumer`] by
//! value, each wrapping the same `Arc<Ring>`; only the producer half calls
//! `try_write`/`is_full`/`write_position`, only the consumer half calls
//! `try_read`/`peek`/`is_empty`/`read_position`. Nothing in the type system
//! stops a caller from moving both halves into the same thread, but the
//! split interface makes the intended single-writer/single-reader
//! discipline the obvious way to use it.

use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    pub slot_size: usize,
    pub ring_slots: u64,
}

impl RingConfig {
    pub fn max_payload(&self) -> usize {
        self.slot_size - HEADER_SIZE
    }

    fn file_len(&self) -> u64 {
        self.slot_size as u64 * self.ring_slots
    }
}

struct Ring {
    // Keeps the mapping alive; never touched again after construction.
    // Byte access goes through `base`, guarded by the producer/consumer
    // counter discipline rather than Rust's aliasing rules.
    _mmap: MmapMut,
    base: *mut u8,
    config: RingConfig,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
}

// SAFETY: `base` points into `_mmap`, which is never reallocated or moved
// after construction. Concurrent access to a slot is serialized by the
// producer/consumer handoff: the producer only touches slot
// `write_pos % ring_slots` before publishing `write_pos`, the consumer
// only touches slots with index `< write_pos` and `>= read_pos`.
unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
    fn slot_offset(&self, position: u64) -> usize {
        let idx = position % self.config.ring_slots;
        idx as usize * self.config.slot_size
    }

    /// # Safety
    /// Caller must hold the producer role for this ring (no concurrent
    /// writers) and must have already verified capacity and payload size.
    unsafe fn write_slot(&self, position: u64, data: &[u8]) {
        let offset = self.slot_offset(position);
        unsafe {
            let slot = self.base.add(offset);
            slot.cast::<u32>().write_unaligned(data.len() as u32);
            slot.add(4).cast::<u32>().write_unaligned(0);
            std::ptr::copy_nonoverlapping(data.as_ptr(), slot.add(HEADER_SIZE), data.len());
        }
    }

    /// # Safety
    /// Caller must hold the consumer role for this ring and must have
    /// already verified the slot at `position` was published by the
    /// producer (`position < write_pos`).
    unsafe fn read_slot(&self, position: u64) -> Vec<u8> {
        let offset = self.slot_offset(position);
        unsafe {
            let slot = self.base.add(offset);
            let len = slot.cast::<u32>().read_unaligned() as usize;
            std::slice::from_raw_parts(slot.add(HEADER_SIZE), len).to_vec()
        }
    }
}

/// Opens (always fresh — truncated and re-created) a ring-backed file at
/// `path` and returns the producer and consumer halves.
pub fn create(path: impl AsRef<Path>, config: RingConfig) -> std::io::Result<(RingProducer, RingConsumer)> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(config.file_len())?;

    // SAFETY: `file` was just created/truncated to the exact mapped length
    // and is not shared with another process.
    let mut mmap = unsafe { MmapMut::map_mut(&file)? };
    let base = mmap.as_mut_ptr();

    let ring = Arc::new(Ring {
        _mmap: mmap,
        base,
        config,
        write_pos: AtomicU64::new(0),
        read_pos: AtomicU64::new(0),
    });

    Ok((RingProducer { ring: ring.clone() }, RingConsumer { ring }))
}

/// Producer half of a [`Ring`]. Owns `write_pos`.
pub struct RingProducer {
    ring: Arc<Ring>,
}

impl RingProducer {
    /// Rejects if `data` is too large for a slot, or if the ring is full.
    /// Returns whether the write happened — callers treat `false` as
    /// backpressure, not an error.
    pub fn try_write(&self, data: &[u8]) -> bool {
        if data.len() > self.ring.config.max_payload() {
            return false;
        }
        let write_pos = self.ring.write_pos.load(Ordering::Relaxed);
        let read_pos = self.ring.read_pos.load(Ordering::Acquire);
        if write_pos.wrapping_sub(read_pos) >= self.ring.config.ring_slots {
            return false;
        }
        // SAFETY: we are the sole producer and have confirmed capacity.
        unsafe { self.ring.write_slot(write_pos, data) };
        self.ring.write_pos.store(write_pos + 1, Ordering::Release);
        true
    }

    pub fn is_full(&self) -> bool {
        let write_pos = self.ring.write_pos.load(Ordering::Acquire);
        let read_pos = self.ring.read_pos.load(Ordering::Acquire);
        write_pos.wrapping_sub(read_pos) >= self.ring.config.ring_slots
    }

    pub fn write_position(&self) -> u64 {
        self.ring.write_pos.load(Ordering::Acquire)
    }

    pub fn config(&self) -> RingConfig {
        self.ring.config
    }
}

/// Consumer half of a [`Ring`]. Owns `read_pos`.
pub struct RingConsumer {
    ring: Arc<Ring>,
}

impl RingConsumer {
    /// Returns `None` if the ring is empty; else returns the next payload
    /// and advances `read_pos` past it.
    pub fn try_read(&self) -> Option<Vec<u8>> {
        let read_pos = self.ring.read_pos.load(Ordering::Relaxed);
        let write_pos = self.ring.write_pos.load(Ordering::Acquire);
        if read_pos >= write_pos {
            return None;
        }
        // SAFETY: the producer published `write_pos > read_pos`, so this
        // slot has been fully written.
        let payload = unsafe { self.ring.read_slot(read_pos) };
        self.ring.read_pos.store(read_pos + 1, Ordering::Release);
        Some(payload)
    }

    /// As `try_read`, but does not advance `read_pos`.
    pub fn peek(&self) -> Option<Vec<u8>> {
        let read_pos = self.ring.read_pos.load(Ordering::Relaxed);
        let write_pos = self.ring.write_pos.load(Ordering::Acquire);
        if read_pos >= write_pos {
            return None;
        }
        Some(unsafe { self.ring.read_slot(read_pos) })
    }

    pub fn is_empty(&self) -> bool {
        let read_pos = self.ring.read_pos.load(Ordering::Acquire);
        let write_pos = self.ring.write_pos.load(Ordering::Acquire);
        read_pos >= write_pos
    }

    pub fn read_position(&self) -> u64 {
        self.ring.read_pos.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RingConfig {
        RingConfig { slot_size: 64, ring_slots: 4 }
    }

    #[test]
    fn round_trip_single_message() {
        let dir = tempfile::tempdir().unwrap();
        let (producer, consumer) = create(dir.path().join("ring.buf"), small_config()).unwrap();
        assert!(producer.try_write(b"hello"));
        assert_eq!(consumer.try_read(), Some(b"hello".to_vec()));
    }

    #[test]
    fn fifo_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let (producer, consumer) = create(dir.path().join("ring.buf"), small_config()).unwrap();
        for v in [&b"a"[..], &b"bb"[..], &b"ccc"[..]] {
            assert!(producer.try_write(v));
        }
        assert_eq!(consumer.try_read().unwrap(), b"a");
        assert_eq!(consumer.try_read().unwrap(), b"bb");
        assert_eq!(consumer.try_read().unwrap(), b"ccc");
        assert!(consumer.try_read().is_none());
    }

    #[test]
    fn capacity_is_enforced_and_recovers_after_read() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config();
        let (producer, consumer) = create(dir.path().join("ring.buf"), config).unwrap();
        for _ in 0..config.ring_slots {
            assert!(producer.try_write(b"x"));
        }
        assert!(!producer.try_write(b"overflow"));
        assert!(producer.is_full());
        assert_eq!(consumer.try_read(), Some(b"x".to_vec()));
        assert!(producer.try_write(b"y"));
        assert_eq!(producer.write_position(), config.ring_slots + 1);
    }

    #[test]
    fn max_payload_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config();
        let (producer, _consumer) = create(dir.path().join("ring.buf"), config).unwrap();
        let max = vec![0u8; config.max_payload()];
        assert!(producer.try_write(&max));
        let too_big = vec![0u8; config.max_payload() + 1];
        assert!(!producer.try_write(&too_big));
    }

    #[test]
    fn peek_does_not_advance() {
        let dir = tempfile::tempdir().unwrap();
        let (producer, consumer) = create(dir.path().join("ring.buf"), small_config()).unwrap();
        producer.try_write(b"peekme");
        assert_eq!(consumer.peek(), Some(b"peekme".to_vec()));
        assert_eq!(consumer.peek(), Some(b"peekme".to_vec()));
        assert_eq!(consumer.try_read(), Some(b"peekme".to_vec()));
        assert!(consumer.is_empty());
    }
}
