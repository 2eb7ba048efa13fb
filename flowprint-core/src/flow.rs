//! Flow keys and per-worker flow tables.
//!
//! A [`FlowKey`] identifies one direction of a transport stream. The two
//! tables here answer exactly one question for the packet processor: "is
//! this the first data packet of the flow?", which gates initial-data
//! reporting and TCP handshake tracking. Both tables are owned by a single
//! worker thread; there is no cross-thread sharing.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

/// Seconds a flow entry stays relevant without traffic.
const FLOW_IDLE_TIMEOUT: u64 = 120;

/// Directional 5-tuple identifying a transport stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub protocol: u8,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(
        src_addr: IpAddr,
        dst_addr: IpAddr,
        protocol: u8,
        src_port: u16,
        dst_port: u16,
    ) -> Self {
        FlowKey {
            src_addr,
            dst_addr,
            protocol,
            src_port,
            dst_port,
        }
    }

    /// IP version of the flow (4 or 6).
    pub fn ip_version(&self) -> u8 {
        match self.src_addr {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IpFlowEntry {
    last_seen: u64,
}

/// Fixed-capacity table tracking which (non-TCP) flows have been seen.
///
/// Eviction is FIFO by insertion order once the table is full; expired
/// entries are treated as absent.
#[derive(Debug)]
pub struct IpFlowTable {
    entries: HashMap<FlowKey, IpFlowEntry>,
    order: VecDeque<FlowKey>,
    capacity: usize,
}

impl IpFlowTable {
    pub fn new(capacity: usize) -> Self {
        IpFlowTable {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns true exactly when this is the first (non-expired) packet
    /// observed for the flow, and records the observation.
    pub fn flow_is_new(&mut self, key: FlowKey, sec: u64) -> bool {
        if let Some(entry) = self.entries.get_mut(&key) {
            let expired = sec.saturating_sub(entry.last_seen) > FLOW_IDLE_TIMEOUT;
            entry.last_seen = sec;
            return expired;
        }
        self.insert(key, IpFlowEntry { last_seen: sec });
        true
    }

    fn insert(&mut self, key: FlowKey, entry: IpFlowEntry) {
        if self.entries.len() >= self.capacity {
            while let Some(oldest) = self.order.pop_front() {
                if self.entries.remove(&oldest).is_some() {
                    break;
                }
            }
        }
        self.entries.insert(key, entry);
        self.order.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct TcpFlowEntry {
    initial_seq: u32,
    last_seen: u64,
    seen_data: bool,
}

/// Fixed-capacity table of TCP handshake state.
///
/// SYN packets register the initial sequence number; the first segment
/// carrying data at `initial_seq + 1` is the flow's first data packet.
#[derive(Debug)]
pub struct TcpFlowTable {
    entries: HashMap<FlowKey, TcpFlowEntry>,
    order: VecDeque<FlowKey>,
    capacity: usize,
}

impl TcpFlowTable {
    pub fn new(capacity: usize) -> Self {
        TcpFlowTable {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a SYN (or SYN-ACK) for the flow.
    pub fn syn_packet(&mut self, key: FlowKey, sec: u64, seq: u32) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.initial_seq = seq;
            entry.last_seen = sec;
            entry.seen_data = false;
            return;
        }
        if self.entries.len() >= self.capacity {
            while let Some(oldest) = self.order.pop_front() {
                if self.entries.remove(&oldest).is_some() {
                    break;
                }
            }
        }
        self.entries.insert(
            key,
            TcpFlowEntry {
                initial_seq: seq,
                last_seen: sec,
                seen_data: false,
            },
        );
        self.order.push_back(key);
    }

    /// True when `seq` is the first data segment of a tracked handshake
    /// (sequence exactly one past the SYN) and no data has been seen yet.
    pub fn is_first_data_packet(&mut self, key: FlowKey, sec: u64, seq: u32) -> bool {
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        if sec.saturating_sub(entry.last_seen) > FLOW_IDLE_TIMEOUT {
            self.entries.remove(&key);
            return false;
        }
        entry.last_seen = sec;
        if !entry.seen_data && seq == entry.initial_seq.wrapping_add(1) {
            entry.seen_data = true;
            return true;
        }
        false
    }

    /// The SYN sequence number recorded for the flow, if tracked.
    pub fn syn_seq(&self, key: &FlowKey) -> Option<u32> {
        self.entries.get(key).map(|e| e.initial_seq)
    }

    pub fn remove(&mut self, key: &FlowKey) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key(src_port: u16) -> FlowKey {
        FlowKey::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            6,
            src_port,
            443,
        )
    }

    #[test]
    fn test_ip_flow_first_packet() {
        let mut table = IpFlowTable::new(16);
        let k = key(50000);

        assert!(table.flow_is_new(k, 100));
        assert!(!table.flow_is_new(k, 101));
        // after the idle timeout the flow counts as new again
        assert!(table.flow_is_new(k, 101 + FLOW_IDLE_TIMEOUT + 1));
    }

    #[test]
    fn test_ip_flow_eviction_bounds_size() {
        let mut table = IpFlowTable::new(4);
        for p in 0..32 {
            table.flow_is_new(key(40000 + p), 100);
        }
        assert!(table.len() <= 4);
    }

    #[test]
    fn test_tcp_first_data_packet() {
        let mut table = TcpFlowTable::new(16);
        let k = key(50001);

        table.syn_packet(k, 100, 0x1a2b3c4d);
        assert_eq!(table.syn_seq(&k), Some(0x1a2b3c4d));

        // data at ISN+1 is the first data packet, exactly once
        assert!(table.is_first_data_packet(k, 100, 0x1a2b3c4e));
        assert!(!table.is_first_data_packet(k, 100, 0x1a2b3c4e));
        // untracked flow never matches
        assert!(!table.is_first_data_packet(key(50002), 100, 1));
    }

    #[test]
    fn test_tcp_seq_wraparound() {
        let mut table = TcpFlowTable::new(16);
        let k = key(50003);

        table.syn_packet(k, 100, u32::MAX);
        assert!(table.is_first_data_packet(k, 100, 0));
    }
}
