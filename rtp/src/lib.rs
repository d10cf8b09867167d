//! ## RTP: A Transport Protocol for Real-Time Applications
//!
//! This crate decodes the real-time transport protocol (RTP) fixed
//! header, which provides end-to-end delivery services for data with
//! real-time characteristics, such as interactive audio and video.
//! Those services include payload type identification, sequence
//! numbering, timestamping and delivery monitoring.  Applications
//! typically run RTP on top of UDP to make use of its multiplexing and
//! checksum services.
//!
//! Note that RTP itself does not provide any mechanism to ensure timely
//! delivery or provide other quality-of-service guarantees.  It does not
//! guarantee delivery or prevent out-of-order delivery, nor does it
//! assume that the underlying network is reliable and delivers packets
//! in sequence.  The sequence numbers included in RTP allow the receiver
//! to reconstruct the sender's packet sequence.
//!
//! Header extensions are not supported here: a datagram with the
//! extension bit set fails to parse.

pub mod header;

pub use header::Header;

use std::convert::TryFrom;

use anyhow::ensure;
use bytes::Bytes;

/// A parsed RTP packet.
///
/// The packet keeps the original datagram buffer and addresses its
/// payload as an offset and length into it, so moving a packet between
/// queues or threads never copies payload bytes.
///
/// ```bash
///   0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            payload                            |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Header,
    data: Bytes,
    payload_offset: usize,
    payload_len: usize,
}

impl Packet {
    /// Payload bytes as a zero-copy slice of the original datagram.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use rtp::Packet;
    /// use bytes::Bytes;
    /// use std::convert::TryFrom;
    ///
    /// let buffer = [
    ///     0x80, 0xe0, 0x12, 0x34, 0xf8, 0x87, 0x3f, 0xad, 0x67, 0xfe,
    ///     0x9d, 0xfc, 0xde, 0xad, 0xbe, 0xef,
    /// ];
    ///
    /// let packet = Packet::try_from(Bytes::copy_from_slice(&buffer)).unwrap();
    /// assert_eq!(packet.header.marker, true);
    /// assert_eq!(packet.header.payload_type, 0x60);
    /// assert_eq!(packet.header.sequence_number, 0x1234);
    /// assert_eq!(packet.payload_offset(), 12);
    /// assert_eq!(packet.payload().as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    /// ```
    pub fn payload(&self) -> Bytes {
        self.data
            .slice(self.payload_offset..self.payload_offset + self.payload_len)
    }

    /// Byte index of the payload within the datagram, `12 + 4 * CC`.
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// The whole datagram the packet was parsed from.
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }
}

impl TryFrom<Bytes> for Packet {
    type Error = anyhow::Error;

    fn try_from(data: Bytes) -> Result<Self, Self::Error> {
        let header = Header::try_from(&data[..])?;
        let payload_offset = header.len();
        ensure!(data.len() >= payload_offset, "buf len is too short!");

        Ok(Self {
            payload_len: data.len() - payload_offset,
            payload_offset,
            header,
            data,
        })
    }
}
