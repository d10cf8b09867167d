use std::collections::VecDeque;
use std::convert::TryFrom;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use rtp::Packet;

use crate::observer::Observer;
use crate::source::Datagram;
use crate::statistics::{Statistics, Stats};

/// Packets already placed in sequence order.
///
/// `marker_count` always equals the number of marker packets currently
/// in `packets`; both are guarded by the same lock.
#[derive(Default)]
pub(crate) struct SequencedQueue {
    pub packets: VecDeque<Packet>,
    pub marker_count: usize,
}

/// State shared between the receive callback, the sequencing worker and
/// the consumer api.
///
/// Two locks split the pipeline: the receive side takes `recv` only, so
/// the socket callback can enqueue while a consumer drains `sequenced`.
/// They are never acquired in reverse order.
pub(crate) struct Shared {
    pub recv: Mutex<VecDeque<Packet>>,
    pub recv_available: Condvar,
    pub sequenced: Mutex<SequencedQueue>,
    pub sequenced_available: Condvar,
    running: AtomicBool,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            recv: Mutex::new(VecDeque::new()),
            recv_available: Condvar::new(),
            sequenced: Mutex::new(SequencedQueue::default()),
            sequenced_available: Condvar::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Clear the running flag and wake every waiter so it can observe
    /// the flag and bail out.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.recv_available.notify_all();
        self.sequenced_available.notify_all();
    }

    pub fn clear(&self) {
        self.recv.lock().clear();

        let mut sequenced = self.sequenced.lock();
        sequenced.packets.clear();
        sequenced.marker_count = 0;
    }

    /// Push a parsed packet from the receive side and wake the worker.
    pub fn enqueue(&self, packet: Packet) {
        self.recv.lock().push_back(packet);
        self.recv_available.notify_one();
    }

    /// Remove and return the earliest sequenced packet's payload.
    pub fn next_payload(&self) -> Option<Bytes> {
        let mut sequenced = self.sequenced.lock();
        let packet = sequenced.packets.pop_front()?;
        if packet.header.marker {
            sequenced.marker_count -= 1;
        }

        Some(packet.payload())
    }

    /// Remove the earliest complete frame and return its payload bytes
    /// as one contiguous buffer, or `None` when no marker packet has
    /// been sequenced yet.
    ///
    /// A frame is the run of packets from the front of the sequenced
    /// queue up to and including the first marker packet.
    pub fn next_frame(&self) -> Option<Bytes> {
        let mut sequenced = self.sequenced.lock();
        if sequenced.marker_count == 0 {
            return None;
        }

        let mut size = 0;
        for packet in sequenced.packets.iter() {
            size += packet.payload_len();
            if packet.header.marker {
                break;
            }
        }

        let mut frame = BytesMut::with_capacity(size);
        while let Some(packet) = sequenced.packets.pop_front() {
            frame.put(packet.payload());
            if packet.header.marker {
                sequenced.marker_count -= 1;
                break;
            }
        }

        Some(frame.freeze())
    }
}

/// Receive path: parse a datagram and enqueue it for the worker.
///
/// A datagram that fails to parse is reported as invalid data and takes
/// no further part in the pipeline.
pub(crate) fn ingest<T: Observer>(
    shared: &Shared,
    observer: &T,
    statistics: &Statistics,
    datagram: Datagram,
) {
    statistics.add(Stats::ReceivedPkts(1));
    statistics.add(Stats::ReceivedBytes(datagram.len() as u64));

    match Packet::try_from(datagram.data.clone()) {
        Ok(packet) => shared.enqueue(packet),
        Err(e) => {
            log::debug!("invalid datagram: addr={:?}, {}", datagram.remote, e);
            observer.invalid_data(&datagram);
        }
    }
}

/// Sequencing worker loop.
///
/// The first arrived packet supplies the initial expected sequence
/// number and the reference payload type; from then on the worker pulls
/// the expected sequence number out of the reception queue, waiting for
/// it to arrive and declaring it lost when the queue fills to
/// `max_buffered` without it.
///
/// The expected counter is a `u16` and wraps with the sequence number
/// space.
pub(crate) fn run<T: Observer>(
    shared: Arc<Shared>,
    observer: Arc<T>,
    statistics: Statistics,
    verify_payload_type: bool,
    max_buffered: usize,
) {
    let Some((mut expected, reference_payload_type)) = bootstrap(&shared) else {
        return;
    };

    log::info!(
        "sequencing started: first_sequence={}, payload_type={}",
        expected,
        reference_payload_type
    );

    while shared.running() {
        let found = {
            let mut recv = shared.recv.lock();
            loop {
                if !shared.running() {
                    return;
                }

                if let Some(index) = recv
                    .iter()
                    .position(|p| p.header.sequence_number == expected)
                {
                    break recv.remove(index);
                }

                // Declare the expected sequence number lost only under
                // pressure; as long as the queue has room keep waiting
                // for late arrivals.
                if recv.len() >= max_buffered {
                    break None;
                }

                shared.recv_available.wait(&mut recv);
            }
        };

        let packet = match found {
            Some(packet) => packet,
            None => {
                log::debug!("packet loss: sequence={}", expected);
                statistics.add(Stats::LostPkts(1));
                observer.packet_loss(expected);
                expected = expected.wrapping_add(1);
                continue;
            }
        };

        expected = expected.wrapping_add(1);

        if verify_payload_type
            && packet.header.payload_type != reference_payload_type
        {
            statistics.add(Stats::InvalidPkts(1));
            observer.invalid_packet(&packet);
            continue;
        }

        let marker = packet.header.marker;
        {
            let mut sequenced = shared.sequenced.lock();
            if marker {
                sequenced.marker_count += 1;
            }

            sequenced.packets.push_back(packet.clone());
        }

        shared.sequenced_available.notify_all();

        statistics.add(Stats::SequencedPkts(1));
        if marker {
            statistics.add(Stats::MarkerPkts(1));
        }

        observer.sequenced_packet_received(&packet);
        if marker {
            observer.sequenced_marker_received(&packet);
        }

        observer.packet_received(&packet);
        if marker {
            observer.marker_received(&packet);
        }
    }
}

/// Wait for the first packet and take its sequence number and payload
/// type as the reference point. The packet stays in the queue; the
/// steady state loop selects it as the first expected one.
fn bootstrap(shared: &Shared) -> Option<(u16, u8)> {
    let mut recv = shared.recv.lock();
    loop {
        if !shared.running() {
            return None;
        }

        if let Some(first) = recv.front() {
            return Some((first.header.sequence_number, first.header.payload_type));
        }

        shared.recv_available.wait(&mut recv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread::{sleep, JoinHandle};
    use std::time::Duration;

    use rtp::Header;

    fn packet(
        sequence_number: u16,
        marker: bool,
        payload_type: u8,
        payload: &[u8],
    ) -> Packet {
        let mut buf = BytesMut::new();
        Header {
            padding: false,
            marker,
            payload_type,
            sequence_number,
            timestamp: sequence_number as u32 * 3000,
            ssrc: 0x1234_5678,
            csrc: Vec::new(),
        }
        .encode(&mut buf);
        buf.put(payload);
        Packet::try_from(buf.freeze()).unwrap()
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    enum Event {
        Sequenced(u16),
        SequencedMarker(u16),
        Received(u16),
        Marker(u16),
        Loss(u16),
        Invalid(u16),
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<Event>>);

    impl Events {
        fn all(&self) -> Vec<Event> {
            self.0.lock().clone()
        }
    }

    impl Observer for Events {
        fn invalid_packet(&self, packet: &Packet) {
            self.0
                .lock()
                .push(Event::Invalid(packet.header.sequence_number));
        }

        fn packet_received(&self, packet: &Packet) {
            self.0
                .lock()
                .push(Event::Received(packet.header.sequence_number));
        }

        fn marker_received(&self, packet: &Packet) {
            self.0
                .lock()
                .push(Event::Marker(packet.header.sequence_number));
        }

        fn sequenced_packet_received(&self, packet: &Packet) {
            self.0
                .lock()
                .push(Event::Sequenced(packet.header.sequence_number));
        }

        fn sequenced_marker_received(&self, packet: &Packet) {
            self.0
                .lock()
                .push(Event::SequencedMarker(packet.header.sequence_number));
        }

        fn packet_loss(&self, sequence_number: u16) {
            self.0.lock().push(Event::Loss(sequence_number));
        }
    }

    struct Harness {
        shared: Arc<Shared>,
        events: Arc<Events>,
        worker: Option<JoinHandle<()>>,
    }

    impl Harness {
        fn new(verify_payload_type: bool, max_buffered: usize) -> Self {
            let shared = Arc::new(Shared::new());
            let events = Arc::new(Events::default());
            shared.start();

            let worker = {
                let shared = shared.clone();
                let events = events.clone();
                std::thread::spawn(move || {
                    run(
                        shared,
                        events,
                        Statistics::default(),
                        verify_payload_type,
                        max_buffered,
                    )
                })
            };

            Self {
                shared,
                events,
                worker: Some(worker),
            }
        }

        fn feed(&self, packets: &[(u16, bool, u8)]) {
            for (sequence_number, marker, payload_type) in packets {
                self.shared.enqueue(packet(
                    *sequence_number,
                    *marker,
                    *payload_type,
                    &sequence_number.to_be_bytes(),
                ));
            }
        }

        fn wait_frame(&self) -> Bytes {
            for _ in 0..500 {
                if let Some(frame) = self.shared.next_frame() {
                    return frame;
                }

                sleep(Duration::from_millis(2));
            }

            panic!("no frame became available");
        }

        fn wait_sequenced(&self, count: usize) {
            for _ in 0..500 {
                if self.shared.sequenced.lock().packets.len() >= count {
                    return;
                }

                sleep(Duration::from_millis(2));
            }

            panic!("sequenced queue never reached {} packets", count);
        }

        fn wait_events(&self, count: usize) {
            for _ in 0..500 {
                if self.events.all().len() >= count {
                    return;
                }

                sleep(Duration::from_millis(2));
            }

            panic!("never saw {} events", count);
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.shared.shutdown();
            if let Some(worker) = self.worker.take() {
                worker.join().unwrap();
            }
        }
    }

    fn concat(sequence_numbers: &[u16]) -> Vec<u8> {
        sequence_numbers
            .iter()
            .flat_map(|s| s.to_be_bytes())
            .collect()
    }

    #[test]
    fn frames_in_order_input() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(10, false, 96), (11, false, 96), (12, true, 96)]);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[10, 11, 12]));
        assert!(harness.shared.next_frame().is_none());
        assert_eq!(harness.shared.sequenced.lock().marker_count, 0);
    }

    #[test]
    fn reorders_late_packet() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(10, false, 96), (12, true, 96), (11, false, 96)]);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[10, 11, 12]));
        harness.wait_events(8);

        let events = harness.events.all();
        let sequenced: Vec<&Event> = events
            .iter()
            .filter(|e| matches!(e, Event::Sequenced(_)))
            .collect();
        assert_eq!(
            sequenced,
            vec![
                &Event::Sequenced(10),
                &Event::Sequenced(11),
                &Event::Sequenced(12)
            ]
        );
    }

    #[test]
    fn declares_loss_under_pressure() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(10, false, 96), (12, true, 96)]);

        // 25 packets that are not sequence number 11 force the gap to be
        // given up on.
        let filler: Vec<(u16, bool, u8)> =
            (100..125).map(|s| (s, false, 96)).collect();
        harness.feed(&filler);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[10, 12]));
        assert!(harness.events.all().contains(&Event::Loss(11)));
    }

    #[test]
    fn drops_mismatched_payload_type_when_verifying() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(10, false, 96), (11, false, 97), (12, true, 96)]);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[10, 12]));
        assert!(harness.events.all().contains(&Event::Invalid(11)));
    }

    #[test]
    fn keeps_mismatched_payload_type_when_not_verifying() {
        let harness = Harness::new(false, 25);
        harness.feed(&[(10, false, 96), (11, false, 97), (12, true, 96)]);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[10, 11, 12]));
        assert!(!harness.events.all().contains(&Event::Invalid(11)));
    }

    #[test]
    fn sequences_across_wrap_around() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(65534, false, 96), (65535, false, 96), (0, true, 96)]);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[65534, 65535, 0]));
    }

    #[test]
    fn first_duplicate_wins() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(20, false, 96), (20, false, 96), (21, true, 96)]);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[20, 21]));

        // the duplicate stays in the reception queue until pressure ages
        // it out
        assert_eq!(harness.shared.recv.lock().len(), 1);
    }

    #[test]
    fn marker_events_follow_packet_events() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(7, true, 96)]);
        harness.wait_events(4);

        assert_eq!(
            harness.events.all(),
            vec![
                Event::Sequenced(7),
                Event::SequencedMarker(7),
                Event::Received(7),
                Event::Marker(7),
            ]
        );
    }

    #[test]
    fn next_payload_pops_single_packets() {
        let harness = Harness::new(true, 25);
        harness.feed(&[(30, false, 96), (31, true, 96)]);
        harness.wait_sequenced(2);

        assert_eq!(
            harness.shared.next_payload().unwrap().as_ref(),
            30u16.to_be_bytes()
        );
        assert_eq!(harness.shared.sequenced.lock().marker_count, 1);

        assert_eq!(
            harness.shared.next_payload().unwrap().as_ref(),
            31u16.to_be_bytes()
        );
        assert_eq!(harness.shared.sequenced.lock().marker_count, 0);

        assert!(harness.shared.next_payload().is_none());
        assert!(harness.shared.next_frame().is_none());
    }

    #[test]
    fn consecutive_frames_cut_at_each_marker() {
        let harness = Harness::new(true, 25);
        harness.feed(&[
            (40, false, 96),
            (41, true, 96),
            (42, false, 96),
            (43, true, 96),
        ]);

        assert_eq!(harness.wait_frame().as_ref(), concat(&[40, 41]));
        assert_eq!(harness.wait_frame().as_ref(), concat(&[42, 43]));
    }

    #[test]
    fn shutdown_releases_an_idle_worker() {
        let harness = Harness::new(true, 25);

        // never fed anything: the worker is parked in bootstrap and must
        // still exit promptly
        drop(harness);
    }

    #[test]
    fn invalid_datagram_is_reported_not_enqueued() {
        let shared = Shared::new();
        let events = Events::default();
        let statistics = Statistics::default();

        ingest(
            &shared,
            &events,
            &statistics,
            Datagram {
                data: Bytes::from_static(&[0xc0, 0x00, 0x00]),
                remote: "127.0.0.1:5004".parse().unwrap(),
            },
        );

        assert!(shared.recv.lock().is_empty());
        assert_eq!(statistics.counts().received_packets, 1);
        assert_eq!(statistics.counts().received_bytes, 3);
    }
}
