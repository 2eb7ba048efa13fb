//! TCP reassembler for split handshake messages.
//!
//! When a parser reports that a handshake declares more bytes than the
//! segment carries, the worker stashes what it has with the number of
//! additional bytes needed; subsequent segments are copied into the
//! pending buffer at their sequence offset until the required length is
//! reached. Entries are bounded (one 8 KiB buffer each), keyed by flow,
//! and reaped after 30 seconds of silence so a dead flow cannot pin
//! memory. A flow only ever has one pending reassembly; collisions
//! replace the prior entry.

use std::collections::{HashMap, VecDeque};

use crate::flow::FlowKey;

/// Capacity of one reassembly buffer.
pub const REASSEMBLY_BUF_LEN: usize = 8192;

/// Seconds before an unfinished entry is reaped.
pub const REASSEMBLY_TIMEOUT: u64 = 30;

struct SegmentEntry {
    /// Sequence number of buffer offset 0.
    base_seq: u32,
    /// Contiguous bytes collected so far.
    fill: usize,
    /// Total bytes needed to complete the message.
    required: usize,
    first_seen: u64,
    buf: Box<[u8]>,
}

/// An entry handed back to the caller, either completed or reaped.
pub struct Reassembled {
    pub key: FlowKey,
    len: usize,
    buf: Box<[u8]>,
}

impl Reassembled {
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Per-worker TCP reassembler.
pub struct TcpReassembler {
    entries: HashMap<FlowKey, SegmentEntry>,
    order: VecDeque<FlowKey>,
}

impl TcpReassembler {
    pub fn new() -> Self {
        TcpReassembler {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Stash the first, truncated segment of a handshake. `seq` is the
    /// segment's sequence number; `additional_bytes_needed` is the parse
    /// deficit. Returns false (and stores nothing) when the completed
    /// message could never fit the buffer, in which case the caller emits
    /// the truncated parse as-is.
    pub fn copy_packet(
        &mut self,
        key: FlowKey,
        now: u64,
        seq: u32,
        payload: &[u8],
        additional_bytes_needed: usize,
    ) -> bool {
        let required = payload.len() + additional_bytes_needed;
        if required > REASSEMBLY_BUF_LEN || payload.is_empty() {
            return false;
        }

        let mut buf = vec![0u8; REASSEMBLY_BUF_LEN].into_boxed_slice();
        buf[..payload.len()].copy_from_slice(payload);

        // a collision replaces the prior entry for this flow
        self.entries.insert(
            key,
            SegmentEntry {
                base_seq: seq,
                fill: payload.len(),
                required,
                first_seen: now,
                buf,
            },
        );
        self.order.push_back(key);
        true
    }

    /// Offer a segment to a pending reassembly. Segments that extend the
    /// contiguous fill are copied in (overlap tolerated); a segment that
    /// would leave a gap is ignored. When the required length is reached
    /// the finished entry is removed and returned.
    pub fn check_packet(
        &mut self,
        key: FlowKey,
        _now: u64,
        seq: u32,
        payload: &[u8],
    ) -> Option<Reassembled> {
        let entry = self.entries.get_mut(&key)?;

        let offset = seq.wrapping_sub(entry.base_seq) as usize;
        if offset > entry.required || payload.is_empty() {
            return None;
        }
        if offset > entry.fill {
            // gap: sequence beyond what we have; wait for the hole
            return None;
        }
        let end = (offset + payload.len()).min(entry.required);
        if end > entry.buf.len() {
            // would overflow the buffer: abandon the reassembly
            self.entries.remove(&key);
            return None;
        }
        entry.buf[offset..end].copy_from_slice(&payload[..end - offset]);
        if end > entry.fill {
            entry.fill = end;
        }

        if entry.fill >= entry.required {
            let entry = self.entries.remove(&key)?;
            return Some(Reassembled {
                key,
                len: entry.required,
                buf: entry.buf,
            });
        }
        None
    }

    /// True when a reassembly is pending for the flow.
    pub fn is_in_progress(&self, key: &FlowKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Pop the oldest entry whose age exceeds [`REASSEMBLY_TIMEOUT`] so
    /// the caller can emit whatever was collected.
    pub fn reap(&mut self, now: u64) -> Option<Reassembled> {
        while let Some(key) = self.order.front().copied() {
            let Some(entry) = self.entries.get(&key) else {
                // stale order entry (already completed or replaced)
                self.order.pop_front();
                continue;
            };
            if now.saturating_sub(entry.first_seen) <= REASSEMBLY_TIMEOUT {
                return None;
            }
            self.order.pop_front();
            let entry = self.entries.remove(&key)?;
            return Some(Reassembled {
                key,
                len: entry.fill,
                buf: entry.buf,
            });
        }
        None
    }

    /// Drop the pending entry for a flow.
    pub fn remove_segment(&mut self, key: &FlowKey) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TcpReassembler {
    fn default() -> Self {
        Self::new()
    }
}
