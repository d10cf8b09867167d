use std::convert::TryFrom;

use anyhow::ensure;
use bytes::{Buf, BufMut, BytesMut};

const MARKER_MASK: u8 = 0b10000000;
const VERSION_MASK: u8 = 0b11000000;
const PADDING_MASK: u8 = 0b00100000;
const EXTENSION_MASK: u8 = 0b00010000;
const CSRC_COUNT_MASK: u8 = 0b00001111;
const PAYLOAD_TYPE_MASK: u8 = 0b01111111;

/// RTP Header.
///
/// ### RTP Fixed Header Fields
///
/// ```bash
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |V=2|P|X|  CC   |M|     PT      |       sequence number         |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                           timestamp                           |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |           synchronization source (SSRC) identifier            |
///  +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
///  |            contributing source (CSRC) identifiers             |
///  |                             ....                              |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone)]
pub struct Header {
    /// If the padding bit is set, the packet contains one or more
    /// additional padding octets at the end which are not part of the
    /// payload.
    pub padding: bool,
    /// The interpretation of the marker is defined by a profile.  It is
    /// intended to allow significant events such as frame boundaries to
    /// be marked in the packet stream.
    pub marker: bool,
    /// This field identifies the format of the RTP payload and determines
    /// its interpretation by the application.  A profile MAY specify a
    /// default static mapping of payload type codes to payload formats.
    pub payload_type: u8,
    /// The sequence number increments by one for each RTP data packet
    /// sent, and may be used by the receiver to detect packet loss and to
    /// restore packet sequence.
    pub sequence_number: u16,
    /// The timestamp reflects the sampling instant of the first octet in
    /// the RTP data packet.
    pub timestamp: u32,
    /// The SSRC field identifies the synchronization source.  This
    /// identifier SHOULD be chosen randomly, with the intent that no two
    /// synchronization sources within the same RTP session will have the
    /// same SSRC identifier.
    pub ssrc: u32,
    /// The CSRC list identifies the contributing sources for the payload
    /// contained in this packet.  The number of identifiers is given by
    /// the CC field.  If there are more than 15 contributing sources,
    /// only 15 can be identified.
    pub csrc: Vec<u32>,
}

impl Header {
    /// Encoded size of the header in bytes.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use rtp::header::Header;
    /// use std::convert::TryFrom;
    ///
    /// let buffer = [
    ///     0x80, 0xe0, 0x12, 0x34, 0xf8, 0x87, 0x3f, 0xad, 0x67, 0xfe,
    ///     0x9d, 0xfc
    /// ];
    ///
    /// let header = Header::try_from(&buffer[..]).unwrap();
    /// assert_eq!(header.len(), 12);
    /// ```
    pub fn len(&self) -> usize {
        12 + (self.csrc.len() * 4)
    }

    /// # Unit Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use rtp::header::Header;
    ///
    /// let buffer = [
    ///     0x80, 0xe0, 0x12, 0x34, 0xf8, 0x87, 0x3f, 0xad, 0x67, 0xfe,
    ///     0x9d, 0xfc
    /// ];
    ///
    /// let header = Header {
    ///     padding: false,
    ///     marker: true,
    ///     payload_type: 0x60,
    ///     sequence_number: 0x1234,
    ///     timestamp: 4169613229,
    ///     ssrc: 1744739836,
    ///     csrc: Vec::new(),
    /// };
    ///
    /// let mut writer = BytesMut::new();
    /// header.encode(&mut writer);
    /// assert_eq!(&writer[..], &buffer[..]);
    /// ```
    #[rustfmt::skip]
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut basic = [0u8; 2];

        basic[0] = 2 << 6;
        basic[0] = if self.padding { basic[0] | PADDING_MASK } else { basic[0] };
        basic[0] |= (self.csrc.len() as u8) & CSRC_COUNT_MASK;

        basic[1] = if self.marker { MARKER_MASK } else { 0 };
        basic[1] |= self.payload_type & PAYLOAD_TYPE_MASK;

        buf.put(&basic[..]);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for item in &self.csrc {
            buf.put_u32(*item);
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for Header {
    type Error = anyhow::Error;
    /// # Unit Test
    ///
    /// ```
    /// use rtp::header::Header;
    /// use std::convert::TryFrom;
    ///
    /// let buffer = [
    ///     0x80, 0xe0, 0x12, 0x34, 0xf8, 0x87, 0x3f, 0xad, 0x67, 0xfe,
    ///     0x9d, 0xfc
    /// ];
    ///
    /// let header = Header::try_from(&buffer[..]).unwrap();
    /// assert_eq!(header.padding, false);
    /// assert_eq!(header.marker, true);
    /// assert_eq!(header.payload_type, 0x60);
    /// assert_eq!(header.sequence_number, 0x1234);
    /// assert_eq!(header.timestamp, 4169613229);
    /// assert_eq!(header.ssrc, 1744739836);
    /// assert_eq!(header.csrc.len(), 0);
    /// ```
    #[rustfmt::skip]
    fn try_from(mut buf: &'a [u8]) -> Result<Self, Self::Error> {
        ensure!(buf.len() >= 12, "buf len < 12");

        // lock rtp version in rfc 3550
        let version = (buf[0] & VERSION_MASK) >> 6;
        ensure!(version == 2, "rtp version is not rfc3550!");

        let padding = ((buf[0] & PADDING_MASK) >> 5) == 1;
        let extension = ((buf[0] & EXTENSION_MASK) >> 4) == 1;
        ensure!(!extension, "rtp header extension is not supported!");

        let csrc_count = (buf[0] & CSRC_COUNT_MASK) as usize;
        let marker = ((buf[1] & MARKER_MASK) >> 7) == 1;
        let payload_type = buf[1] & PAYLOAD_TYPE_MASK;
        buf.advance(2);

        let size = 10 + (csrc_count * 4);
        ensure!(buf.len() >= size, "buf len is too short!");

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        let csrc = (0..csrc_count)
            .map(|_| buf.get_u32())
            .collect::<Vec<u32>>();

        Ok(Self {
            padding,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
        })
    }
}
