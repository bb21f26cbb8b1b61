//! Lock-free ring buffer for audio samples
//!
//! This implements a single-producer single-consumer (SPSC) ring buffer of
//! mono `f32` samples shared between the control-plane context (writer) and
//! the real-time render callback (reader).
//!
//! Each side owns exactly one cursor and only ever loads the other. A transfer
//! copies the samples first and publishes the advanced cursor afterwards, so a
//! peer that observes the new cursor also observes the samples behind it.
//! One slot is always left empty to tell "full" apart from "empty".

use crossbeam::utils::CachePadded;
use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::AudioError;

/// Fixed-capacity circular sample store with two atomic cursors.
///
/// Slots hold `f32` bit patterns in `AtomicU32` cells so that both contexts
/// can touch the storage without `unsafe`. Slot accesses are `Relaxed`; the
/// cursor loads and stores are `SeqCst` and carry the ordering.
pub struct RingBuffer {
    slots: Box<[AtomicU32]>,
    read_cursor: CachePadded<AtomicUsize>,
    write_cursor: CachePadded<AtomicUsize>,
}

impl RingBuffer {
    /// Allocate a ring buffer with `capacity` slots (`capacity - 1` usable).
    ///
    /// Fails instead of aborting when the allocation cannot be satisfied.
    pub fn new(capacity: usize) -> Result<Self, AudioError> {
        if capacity < 2 {
            return Err(AudioError::InvalidCapacity(capacity));
        }

        let slots = allocate_slots(capacity).map_err(|e| {
            tracing::error!("Sample buffer allocation failed: {}", e);
            AudioError::BufferAllocation(capacity)
        })?;

        Ok(Self {
            slots,
            read_cursor: CachePadded::new(AtomicUsize::new(0)),
            write_cursor: CachePadded::new(AtomicUsize::new(0)),
        })
    }

    /// Split into the writer and reader halves.
    pub fn split(self) -> (RingWriter, RingReader) {
        let ring = Arc::new(self);
        (
            RingWriter { ring: ring.clone() },
            RingReader { ring },
        )
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of samples the buffer can hold at once
    pub fn usable_capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Free slots, from a fresh load of both cursors
    pub fn write_available(&self) -> usize {
        let (read, write) = self.cursors();
        write_available(self.capacity(), read, write)
    }

    /// Occupied slots, from a fresh load of both cursors
    pub fn read_available(&self) -> usize {
        let (read, write) = self.cursors();
        read_available(self.capacity(), read, write)
    }

    /// Zero both cursors in place.
    ///
    /// Not synchronized against a transfer in flight on the other side: the
    /// caller must know the peer is not inside `write`/`read`. The stream
    /// handshake in [`crate::audio::control`] provides that guarantee.
    pub fn reset(&self) {
        self.write_cursor.store(0, Ordering::SeqCst);
        self.read_cursor.store(0, Ordering::SeqCst);
    }

    /// Current `(read, write)` cursor positions
    pub fn cursors(&self) -> (usize, usize) {
        (
            self.read_cursor.load(Ordering::SeqCst),
            self.write_cursor.load(Ordering::SeqCst),
        )
    }

    fn store_span(&self, start: usize, samples: &[f32]) {
        for (slot, sample) in self.slots[start..start + samples.len()].iter().zip(samples) {
            slot.store(sample.to_bits(), Ordering::Relaxed);
        }
    }

    fn load_span(&self, start: usize, out: &mut [f32]) {
        let len = out.len();
        for (sample, slot) in out.iter_mut().zip(&self.slots[start..start + len]) {
            *sample = f32::from_bits(slot.load(Ordering::Relaxed));
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (read, write) = self.cursors();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("read_cursor", &read)
            .field("write_cursor", &write)
            .finish()
    }
}

fn allocate_slots(capacity: usize) -> Result<Box<[AtomicU32]>, TryReserveError> {
    let mut slots = Vec::new();
    slots.try_reserve_exact(capacity)?;
    slots.resize_with(capacity, || AtomicU32::new(0.0f32.to_bits()));
    Ok(slots.into_boxed_slice())
}

fn write_available(capacity: usize, read: usize, write: usize) -> usize {
    if read <= write {
        capacity - write + read - 1
    } else {
        read - write - 1
    }
}

fn read_available(capacity: usize, read: usize, write: usize) -> usize {
    if read <= write {
        write - read
    } else {
        capacity - read + write
    }
}

/// Producer half: the only owner of the write cursor.
pub struct RingWriter {
    ring: Arc<RingBuffer>,
}

impl RingWriter {
    /// Copy `samples` in and publish the new write cursor.
    ///
    /// Returns `false` and leaves the buffer untouched when fewer than
    /// `samples.len()` slots are free.
    pub fn write(&mut self, samples: &[f32]) -> bool {
        let ring = &*self.ring;
        let capacity = ring.capacity();
        let read = ring.read_cursor.load(Ordering::SeqCst);
        let write = ring.write_cursor.load(Ordering::SeqCst);

        if write_available(capacity, read, write) < samples.len() {
            return false;
        }

        // Tail segment up to the end of storage, then the head segment.
        let tail = samples.len().min(capacity - write);
        let (first, second) = samples.split_at(tail);
        ring.store_span(write, first);
        ring.store_span(0, second);

        ring.write_cursor
            .store((write + samples.len()) % capacity, Ordering::SeqCst);
        true
    }

    /// Shared view of the underlying buffer
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Whether the reader half has been dropped
    pub fn is_detached(&self) -> bool {
        Arc::strong_count(&self.ring) == 1
    }

    pub fn write_available(&self) -> usize {
        self.ring.write_available()
    }

    pub fn read_available(&self) -> usize {
        self.ring.read_available()
    }
}

/// Consumer half: the only owner of the read cursor.
pub struct RingReader {
    ring: Arc<RingBuffer>,
}

impl RingReader {
    /// Fill `out` from the buffer and publish the new read cursor.
    ///
    /// Returns `false` without touching `out` when fewer than `out.len()`
    /// samples are buffered.
    pub fn read(&mut self, out: &mut [f32]) -> bool {
        let ring = &*self.ring;
        let capacity = ring.capacity();
        let read = ring.read_cursor.load(Ordering::SeqCst);
        let write = ring.write_cursor.load(Ordering::SeqCst);

        if read_available(capacity, read, write) < out.len() {
            return false;
        }

        let len = out.len();
        let tail = len.min(capacity - read);
        let (first, second) = out.split_at_mut(tail);
        ring.load_span(read, first);
        ring.load_span(0, second);

        ring.read_cursor
            .store((read + len) % capacity, Ordering::SeqCst);
        true
    }

    /// Shared view of the underlying buffer
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn read_available(&self) -> usize {
        self.ring.read_available()
    }
}

/// Create a ring buffer and split it in one step
pub fn ring_buffer(capacity: usize) -> Result<(RingWriter, RingReader), AudioError> {
    Ok(RingBuffer::new(capacity)?.split())
}
