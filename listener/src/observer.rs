use rtp::Packet;

use crate::source::Datagram;

/// Listener event observer.
///
/// All methods default to doing nothing, so an implementation only picks
/// the events it cares about. Callbacks are invoked synchronously on the
/// thread that produced the event and never while a queue lock is held;
/// a slow callback delays the pipeline, not other callbacks.
pub trait Observer: Send + Sync {
    /// a datagram arrived that could not be parsed as an rtp packet
    ///
    /// The raw datagram is handed over as-is. The packet takes no further
    /// part in sequencing.
    #[allow(unused)]
    fn invalid_data(&self, datagram: &Datagram) {}

    /// a packet was dropped because its payload type differs from the
    /// reference payload type
    ///
    /// Only fired while payload type verification is enabled. The
    /// reference is the payload type of the first packet the listener
    /// ever saw.
    #[allow(unused)]
    fn invalid_packet(&self, packet: &Packet) {}

    /// a packet was accepted, in raw receive order
    #[allow(unused)]
    fn packet_received(&self, packet: &Packet) {}

    /// a packet carrying the marker bit was accepted, in raw receive
    /// order
    ///
    /// Fired after `packet_received` for the same packet.
    #[allow(unused)]
    fn marker_received(&self, packet: &Packet) {}

    /// a packet was placed into the sequenced queue
    ///
    /// Packets show up here in strictly increasing sequence number order
    /// modulo wrap, with gaps where losses were declared.
    #[allow(unused)]
    fn sequenced_packet_received(&self, packet: &Packet) {}

    /// a packet carrying the marker bit was placed into the sequenced
    /// queue
    ///
    /// Fired after `sequenced_packet_received` for the same packet. Each
    /// of these events means a complete frame is ready for extraction.
    #[allow(unused)]
    fn sequenced_marker_received(&self, packet: &Packet) {}

    /// a sequence number was declared lost
    ///
    /// The reception queue filled to its pressure bound without this
    /// sequence number showing up. There is no retry: the stream advances
    /// past the gap.
    #[allow(unused)]
    fn packet_loss(&self, sequence_number: u16) {}
}

impl Observer for () {}
