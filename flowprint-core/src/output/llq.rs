//! Lock-free single-producer/single-consumer message ring.
//!
//! Each worker thread owns one [`LlqProducer`]; the output thread is the
//! only consumer of every ring. A slot crosses the thread boundary through
//! its `used` flag alone: the producer fills `ts`/`len`/`buf` and then
//! stores `used = 1` with release ordering, the consumer reads the payload
//! only after loading `used == 1` with acquire ordering, and hands the
//! slot back with a release store of `used = 0`. Both ring indices are
//! private to their own side, so no other synchronization is needed.

use std::cell::UnsafeCell;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Slots per ring; must be a power of two.
pub const LLQ_DEPTH: usize = 8;

/// Payload capacity of one slot.
pub const LLQ_MSG_SIZE: usize = 65_536;

/// Seconds the output thread waits for a stalled ring before flushing
/// older records from the others.
pub const LLQ_MAX_AGE: u64 = 5;

/// Packet timestamp; ordering is (seconds, nanoseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub sec: u64,
    pub nsec: u32,
}

impl Timestamp {
    pub fn new(sec: u64, nsec: u32) -> Self {
        Timestamp { sec, nsec }
    }
}

struct MsgBody {
    ts: Timestamp,
    len: u32,
    buf: Box<[u8]>,
}

/// One ring slot. `used` is the only field shared without ownership
/// transfer; `body` belongs to the producer while `used == 0` and to the
/// consumer while `used == 1`.
struct LlqMsg {
    used: AtomicU32,
    body: UnsafeCell<MsgBody>,
}

// Safety: body access is serialized by the used flag protocol described in
// the module docs; producer and consumer never hold the slot concurrently.
unsafe impl Sync for LlqMsg {}

/// Backpressure policy when the producer finds its ring full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Spin until the consumer frees the slot.
    Blocking,
    /// Drop the record and count it.
    Drop,
}

/// The shared ring storage.
pub struct LlqQueue {
    msgs: Vec<LlqMsg>,
    drops: AtomicU64,
}

impl LlqQueue {
    /// Allocate a ring and its producer handle.
    pub fn new(backpressure: Backpressure) -> (LlqProducer, Arc<LlqQueue>) {
        let msgs = (0..LLQ_DEPTH)
            .map(|_| LlqMsg {
                used: AtomicU32::new(0),
                body: UnsafeCell::new(MsgBody {
                    ts: Timestamp::new(0, 0),
                    len: 0,
                    buf: vec![0u8; LLQ_MSG_SIZE].into_boxed_slice(),
                }),
            })
            .collect();
        let queue = Arc::new(LlqQueue {
            msgs,
            drops: AtomicU64::new(0),
        });
        let producer = LlqProducer {
            queue: queue.clone(),
            widx: 0,
            backpressure,
        };
        (producer, queue)
    }

    /// Records dropped because the ring was full (non-blocking mode).
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Consumer: timestamp of the slot at `ridx` if it holds a message.
    pub(crate) fn peek_ts(&self, ridx: usize) -> Option<Timestamp> {
        let msg = &self.msgs[ridx & (LLQ_DEPTH - 1)];
        if msg.used.load(Ordering::Acquire) == 1 {
            // Safety: used == 1 (acquire) means the producer's writes to
            // body happened-before this read, and it will not touch the
            // slot again until we store used = 0.
            Some(unsafe { (*msg.body.get()).ts })
        } else {
            None
        }
    }

    /// Consumer: write the slot payload to `out`, then release the slot.
    ///
    /// Must only be called after `peek_ts` returned `Some` for this index.
    pub(crate) fn consume_into<W: Write>(&self, ridx: usize, out: &mut W) -> io::Result<usize> {
        let msg = &self.msgs[ridx & (LLQ_DEPTH - 1)];
        debug_assert_eq!(msg.used.load(Ordering::Acquire), 1);
        // Safety: as in peek_ts; the slot is ours until used is cleared.
        let written = unsafe {
            let body = &*msg.body.get();
            let len = body.len as usize;
            out.write_all(&body.buf[..len])?;
            len
        };
        msg.used.store(0, Ordering::Release);
        Ok(written)
    }

    /// True when no slot currently holds a message.
    pub fn is_drained(&self) -> bool {
        self.msgs
            .iter()
            .all(|m| m.used.load(Ordering::Acquire) == 0)
    }
}

/// Producer handle; owned by exactly one worker thread.
pub struct LlqProducer {
    queue: Arc<LlqQueue>,
    widx: usize,
    backpressure: Backpressure,
}

impl LlqProducer {
    /// Claim the next slot, let `fill` serialize a record into it, and
    /// publish. `fill` returns the record length; returning 0 abandons the
    /// slot (nothing is published). Returns false when the record was
    /// dropped or abandoned.
    pub fn send<F>(&mut self, ts: Timestamp, fill: F) -> bool
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let msg = &self.queue.msgs[self.widx & (LLQ_DEPTH - 1)];

        while msg.used.load(Ordering::Acquire) != 0 {
            match self.backpressure {
                Backpressure::Blocking => std::hint::spin_loop(),
                Backpressure::Drop => {
                    self.queue.drops.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            }
        }

        // Safety: used == 0, so the consumer is done with the slot and the
        // body is exclusively ours until we store used = 1.
        let published = unsafe {
            let body = &mut *msg.body.get();
            let len = fill(&mut body.buf);
            if len == 0 || len > LLQ_MSG_SIZE {
                false
            } else {
                body.ts = ts;
                body.len = len as u32;
                true
            }
        };
        if !published {
            return false;
        }

        msg.used.store(1, Ordering::Release);
        self.widx = self.widx.wrapping_add(1);
        true
    }

    /// Shared handle to the ring (for registering with the output writer).
    pub fn queue(&self) -> Arc<LlqQueue> {
        self.queue.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fill_bytes(payload: &'static [u8]) -> impl FnOnce(&mut [u8]) -> usize {
        move |buf| {
            buf[..payload.len()].copy_from_slice(payload);
            payload.len()
        }
    }

    #[test]
    fn test_send_and_consume() {
        let (mut producer, queue) = LlqQueue::new(Backpressure::Drop);

        assert!(producer.send(Timestamp::new(1, 0), fill_bytes(b"hello\n")));
        assert_eq!(queue.peek_ts(0), Some(Timestamp::new(1, 0)));

        let mut out = Vec::new();
        queue.consume_into(0, &mut out).unwrap();
        assert_eq!(out, b"hello\n");
        assert_eq!(queue.peek_ts(0), None);
    }

    #[test]
    fn test_zero_length_fill_is_not_published() {
        let (mut producer, queue) = LlqQueue::new(Backpressure::Drop);

        assert!(!producer.send(Timestamp::new(1, 0), |_| 0));
        assert_eq!(queue.peek_ts(0), None);
        // the slot is reused by the next record
        assert!(producer.send(Timestamp::new(2, 0), fill_bytes(b"x")));
        assert_eq!(queue.peek_ts(0), Some(Timestamp::new(2, 0)));
    }

    #[test]
    fn test_full_ring_drops_in_drop_mode() {
        let (mut producer, queue) = LlqQueue::new(Backpressure::Drop);

        for i in 0..LLQ_DEPTH {
            assert!(producer.send(Timestamp::new(i as u64, 0), fill_bytes(b"r")));
        }
        assert!(!producer.send(Timestamp::new(99, 0), fill_bytes(b"r")));
        assert_eq!(queue.drop_count(), 1);
    }

    #[test]
    fn test_fifo_order_within_ring() {
        let (mut producer, queue) = LlqQueue::new(Backpressure::Drop);

        for i in 0..LLQ_DEPTH {
            producer.send(Timestamp::new(i as u64, 0), fill_bytes(b"m"));
        }
        for i in 0..LLQ_DEPTH {
            assert_eq!(queue.peek_ts(i), Some(Timestamp::new(i as u64, 0)));
            let mut sink = Vec::new();
            queue.consume_into(i, &mut sink).unwrap();
        }
        assert!(queue.is_drained());
    }

    // Blocking producer plus consumer on another thread: every message
    // arrives exactly once, in order.
    #[test]
    fn test_no_loss_blocking_mode() {
        const N: u64 = 10_000;
        let (mut producer, queue) = LlqQueue::new(Backpressure::Blocking);

        let consumer = thread::spawn(move || {
            let mut ridx = 0usize;
            let mut seen = Vec::with_capacity(N as usize);
            while seen.len() < N as usize {
                if let Some(ts) = queue.peek_ts(ridx) {
                    let mut sink = Vec::new();
                    queue.consume_into(ridx, &mut sink).unwrap();
                    seen.push(ts.sec);
                    ridx = ridx.wrapping_add(1);
                } else {
                    std::hint::spin_loop();
                }
            }
            seen
        });

        for i in 0..N {
            assert!(producer.send(Timestamp::new(i, 0), fill_bytes(b".")));
        }

        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), N as usize);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp::new(1, 999_999_999) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 1) < Timestamp::new(2, 2));
        assert_eq!(Timestamp::new(3, 4), Timestamp::new(3, 4));
    }
}
