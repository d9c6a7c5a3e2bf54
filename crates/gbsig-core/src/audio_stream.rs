//! Bounded single-producer/single-consumer audio stream.
//!
//! The synthesis driver pushes one 4-byte stereo frame (little-endian `i16`
//! left, then right) per sample tick; a real-time backend pulls bytes at its
//! own cadence. Neither side ever blocks:
//!
//! * when the ring is full the producer drops the oldest eighth of it
//!   before writing,
//! * when the ring runs dry the consumer is handed silence.
//!
//! Slots hold whole frames in an `AtomicU32`, so a frame is never observed
//! half-written. `head` and `tail` are monotonic frame counters; only the
//! producer advances `head`, and both sides advance `tail` with a CAS (the
//! consumer when it pops, the producer when it discards).

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Bytes in one interleaved stereo 16-bit frame.
pub const FRAME_BYTES: usize = 4;
const MIN_FRAMES: usize = 2;

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    read: AtomicU64,
    silence: AtomicU64,
    discarded: AtomicU64,
}

struct Shared {
    slots: Box<[AtomicU32]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    discard_frames: usize,
    counters: Counters,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn occupancy(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.saturating_sub(tail)
    }

    fn stats(&self) -> StreamStats {
        StreamStats {
            occupancy: self.occupancy() * FRAME_BYTES,
            capacity: self.capacity() * FRAME_BYTES,
            written: self.counters.written.load(Ordering::Relaxed),
            read: self.counters.read.load(Ordering::Relaxed),
            silence: self.counters.silence.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the stream's diagnostic counters. All byte counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub occupancy: usize,
    pub capacity: usize,
    pub written: u64,
    pub read: u64,
    /// Bytes handed to the consumer as silence because the ring was empty.
    pub silence: u64,
    /// Bytes dropped from the front of a full ring.
    pub discarded: u64,
}

/// Write half, owned by the synthesis driver.
pub struct AudioProducer {
    shared: Arc<Shared>,
}

/// Read half, owned by the output backend.
pub struct AudioConsumer {
    shared: Arc<Shared>,
    staged: [u8; FRAME_BYTES],
    staged_pos: usize,
}

/// Creates a stream holding `capacity_bytes` of audio.
///
/// The capacity is rounded down to whole frames; anything under two frames
/// is raised to two.
pub fn audio_stream(capacity_bytes: usize) -> (AudioProducer, AudioConsumer) {
    let mut frames = capacity_bytes / FRAME_BYTES;
    if capacity_bytes % FRAME_BYTES != 0 || frames < MIN_FRAMES {
        frames = frames.max(MIN_FRAMES);
        log::warn!(
            "audio stream capacity {} is not a usable multiple of {}; using {} bytes",
            capacity_bytes,
            FRAME_BYTES,
            frames * FRAME_BYTES
        );
    }
    let slots = (0..frames).map(|_| AtomicU32::new(0)).collect();
    let shared = Arc::new(Shared {
        slots,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        discard_frames: (frames / 8).max(1),
        counters: Counters::default(),
    });
    (
        AudioProducer {
            shared: Arc::clone(&shared),
        },
        AudioConsumer {
            shared,
            staged: [0; FRAME_BYTES],
            staged_pos: FRAME_BYTES,
        },
    )
}

impl AudioProducer {
    /// Appends one stereo sample pair.
    pub fn push_stereo(&self, left: i16, right: i16) {
        let [l0, l1] = left.to_le_bytes();
        let [r0, r1] = right.to_le_bytes();
        self.push_frame([l0, l1, r0, r1]);
    }

    /// Appends one raw frame, discarding the oldest chunk first if the ring
    /// is full.
    pub fn push_frame(&self, frame: [u8; FRAME_BYTES]) {
        let shared = &*self.shared;
        let cap = shared.capacity();
        let head = shared.head.load(Ordering::Relaxed);
        let mut tail = shared.tail.load(Ordering::Acquire);
        while head - tail >= cap {
            let target = tail + shared.discard_frames;
            match shared
                .tail
                .compare_exchange(tail, target, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let bytes = (shared.discard_frames * FRAME_BYTES) as u64;
                    shared.counters.discarded.fetch_add(bytes, Ordering::Relaxed);
                    log::debug!(
                        "audio stream full; dropped {} oldest frames",
                        shared.discard_frames
                    );
                    tail = target;
                }
                // The consumer popped meanwhile; re-check with its cursor.
                Err(current) => tail = current,
            }
        }
        shared.slots[head % cap].store(u32::from_le_bytes(frame), Ordering::Release);
        shared.head.store(head + 1, Ordering::Release);
        shared
            .counters
            .written
            .fetch_add(FRAME_BYTES as u64, Ordering::Relaxed);
    }

    /// Queued bytes not yet consumed.
    pub fn occupancy(&self) -> usize {
        self.shared.occupancy() * FRAME_BYTES
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity() * FRAME_BYTES
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.stats()
    }
}

impl AudioConsumer {
    fn pop_frame(&self) -> Option<[u8; FRAME_BYTES]> {
        let shared = &*self.shared;
        let cap = shared.capacity();
        loop {
            let tail = shared.tail.load(Ordering::Acquire);
            let head = shared.head.load(Ordering::Acquire);
            if tail >= head {
                return None;
            }
            let raw = shared.slots[tail % cap].load(Ordering::Acquire);
            if shared
                .tail
                .compare_exchange(tail, tail + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(raw.to_le_bytes());
            }
            // Producer discarded under us; the slot may hold newer data.
        }
    }

    /// Fills `out` completely and returns its length. Bytes the ring cannot
    /// supply are silence, inserted in whole frames so the stream stays
    /// frame-aligned.
    pub fn pull(&mut self, out: &mut [u8]) -> usize {
        let counters = &self.shared.counters;
        for byte in out.iter_mut() {
            if self.staged_pos == FRAME_BYTES {
                match self.pop_frame() {
                    Some(frame) => {
                        self.staged = frame;
                        counters
                            .read
                            .fetch_add(FRAME_BYTES as u64, Ordering::Relaxed);
                    }
                    None => {
                        self.staged = [0; FRAME_BYTES];
                        counters
                            .silence
                            .fetch_add(FRAME_BYTES as u64, Ordering::Relaxed);
                    }
                }
                self.staged_pos = 0;
            }
            *byte = self.staged[self.staged_pos];
            self.staged_pos += 1;
        }
        out.len()
    }

    /// Next stereo pair, or silence if none is queued.
    pub fn pop_stereo(&mut self) -> (i16, i16) {
        let mut frame = [0u8; FRAME_BYTES];
        self.pull(&mut frame);
        (
            i16::from_le_bytes([frame[0], frame[1]]),
            i16::from_le_bytes([frame[2], frame[3]]),
        )
    }

    /// Queued bytes not yet consumed, excluding any partially read frame.
    pub fn occupancy(&self) -> usize {
        self.shared.occupancy() * FRAME_BYTES
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.stats()
    }
}

impl io::Read for AudioConsumer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.pull(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_capacity_is_rounded_to_frames() {
        let (tx, _rx) = audio_stream(10);
        assert_eq!(tx.capacity(), 8);
        let (tx, _rx) = audio_stream(0);
        assert_eq!(tx.capacity(), 8);
    }

    #[test]
    fn partial_reads_keep_frame_alignment_across_underflow() {
        let (tx, mut rx) = audio_stream(64);
        tx.push_frame([1, 2, 3, 4]);
        let mut out = [0xAA; 6];
        rx.pull(&mut out);
        // One real frame, then the first half of a silence frame.
        assert_eq!(out, [1, 2, 3, 4, 0, 0]);

        tx.push_frame([5, 6, 7, 8]);
        let mut out = [0xAA; 4];
        rx.pull(&mut out);
        // Rest of the silence frame comes first, then the new data.
        assert_eq!(out, [0, 0, 5, 6]);
        assert_eq!(rx.stats().silence, 4);
    }

    #[test]
    fn discard_chunk_is_at_least_one_frame() {
        let (tx, mut rx) = audio_stream(8);
        tx.push_stereo(1, 1);
        tx.push_stereo(2, 2);
        tx.push_stereo(3, 3);
        assert_eq!(tx.stats().discarded, 4);
        assert_eq!(rx.pop_stereo(), (2, 2));
        assert_eq!(rx.pop_stereo(), (3, 3));
    }
}
