use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Snapshot of the listener counters.
#[derive(Debug, Clone, Copy)]
pub struct Counts {
    pub received_packets: u64,
    pub received_bytes: u64,
    pub sequenced_packets: u64,
    pub lost_packets: u64,
    pub invalid_packets: u64,
    pub marker_packets: u64,
}

/// The type of information passed to the statistics instance.
#[derive(Debug, Clone, Copy)]
pub enum Stats {
    ReceivedPkts(u64),
    ReceivedBytes(u64),
    SequencedPkts(u64),
    LostPkts(u64),
    InvalidPkts(u64),
    MarkerPkts(u64),
}

#[derive(Default)]
struct Count(AtomicU64);

impl Count {
    fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Counters {
    received_packets: Count,
    received_bytes: Count,
    sequenced_packets: Count,
    lost_packets: Count,
    invalid_packets: Count,
    marker_packets: Count,
}

/// Listener counters.
///
/// Cheap to clone; all clones share the same counter block. Updated from
/// the receive task and the sequencing worker without taking any lock.
#[derive(Default, Clone)]
pub struct Statistics(Arc<Counters>);

impl Statistics {
    pub fn add(&self, payload: Stats) {
        match payload {
            Stats::ReceivedPkts(v) => self.0.received_packets.add(v),
            Stats::ReceivedBytes(v) => self.0.received_bytes.add(v),
            Stats::SequencedPkts(v) => self.0.sequenced_packets.add(v),
            Stats::LostPkts(v) => self.0.lost_packets.add(v),
            Stats::InvalidPkts(v) => self.0.invalid_packets.add(v),
            Stats::MarkerPkts(v) => self.0.marker_packets.add(v),
        }
    }

    pub fn counts(&self) -> Counts {
        Counts {
            received_packets: self.0.received_packets.get(),
            received_bytes: self.0.received_bytes.get(),
            sequenced_packets: self.0.sequenced_packets.get(),
            lost_packets: self.0.lost_packets.get(),
            invalid_packets: self.0.invalid_packets.get(),
            marker_packets: self.0.marker_packets.get(),
        }
    }
}
