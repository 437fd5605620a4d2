//! RTP packet structures (RFC 3550)

use bytes::{BufMut, Bytes, BytesMut};

use crate::h265::ParameterSets;

use super::{RTP_HEADER_SIZE, RTP_VERSION};

/// RTP header structure (12 bytes minimum)
///
/// RFC 3550 Section 5.1:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (always 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// Marker bit (set on the last packet of a frame)
    pub marker: bool,

    /// Payload type (98 for H.265)
    pub payload_type: u8,

    /// Sequence number (16 bits, wraps around)
    pub sequence_number: u16,

    /// Timestamp (90kHz clock for video)
    pub timestamp: u32,

    /// Synchronization source identifier
    pub ssrc: u32,

    /// Contributing sources (at most 15)
    pub csrcs: Vec<u32>,

    /// Extension profile identifier, meaningful when `extension` is set
    pub extension_profile: u16,

    /// Extension payload, padded to a 32-bit boundary on the wire
    pub extension_payload: Bytes,
}

impl RtpHeader {
    /// Creates a header with no CSRCs or extension.
    pub fn new(marker: bool, payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs: Vec::new(),
            extension_profile: 0,
            extension_payload: Bytes::new(),
        }
    }

    /// Size of the serialized header in bytes.
    pub fn marshal_size(&self) -> usize {
        let mut size = RTP_HEADER_SIZE + 4 * self.csrcs.len();
        if self.extension {
            size += 4 + Self::padded_len(self.extension_payload.len());
        }
        size
    }

    fn padded_len(len: usize) -> usize {
        (len + 3) & !3
    }

    /// Parses an RTP header from a byte slice.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < RTP_HEADER_SIZE {
            return None;
        }

        let version = (data[0] >> 6) & 0x03;
        let padding = (data[0] & 0x20) != 0;
        let extension = (data[0] & 0x10) != 0;
        let csrc_count = (data[0] & 0x0F) as usize;

        let marker = (data[1] & 0x80) != 0;
        let payload_type = data[1] & 0x7F;

        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut pos = RTP_HEADER_SIZE;
        if data.len() < pos + 4 * csrc_count {
            return None;
        }
        let mut csrcs = Vec::with_capacity(csrc_count);
        for _ in 0..csrc_count {
            csrcs.push(u32::from_be_bytes([
                data[pos],
                data[pos + 1],
                data[pos + 2],
                data[pos + 3],
            ]));
            pos += 4;
        }

        let mut extension_profile = 0;
        let mut extension_payload = Bytes::new();
        if extension {
            if data.len() < pos + 4 {
                return None;
            }
            extension_profile = u16::from_be_bytes([data[pos], data[pos + 1]]);
            let words = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 4;
            if data.len() < pos + words * 4 {
                return None;
            }
            extension_payload = Bytes::copy_from_slice(&data[pos..pos + words * 4]);
        }

        Some(Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs,
            extension_profile,
            extension_payload,
        })
    }

    /// Serializes the header into `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(
            (self.version << 6)
                | (if self.padding { 0x20 } else { 0 })
                | (if self.extension { 0x10 } else { 0 })
                | (self.csrcs.len() as u8 & 0x0F),
        );
        buf.put_u8((if self.marker { 0x80 } else { 0 }) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrcs {
            buf.put_u32(*csrc);
        }

        if self.extension {
            let padded = Self::padded_len(self.extension_payload.len());
            buf.put_u16(self.extension_profile);
            buf.put_u16((padded / 4) as u16);
            buf.put_slice(&self.extension_payload);
            buf.put_bytes(0, padded - self.extension_payload.len());
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.write_to(&mut buf);
        buf.freeze()
    }
}

/// Complete RTP packet with header and payload.
///
/// `format` rides alongside the packet in process; it is never part of the
/// wire representation.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
    pub format: Option<ParameterSets>,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self {
            header,
            payload,
            format: None,
        }
    }

    /// Parses an RTP packet from bytes.
    pub fn from_bytes(data: Bytes) -> Option<Self> {
        let header = RtpHeader::from_bytes(&data)?;
        let payload = data.slice(header.marshal_size()..);

        Some(Self {
            header,
            payload,
            format: None,
        })
    }

    /// Serializes the packet to bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.header.marshal_size() + self.payload.len());
        self.header.write_to(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtp_header_roundtrip() {
        let header = RtpHeader::new(true, 98, 12345, 90_000, 0x1234_5678);

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), RTP_HEADER_SIZE);

        let parsed = RtpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_rtp_header_with_csrcs() {
        let mut header = RtpHeader::new(false, 98, 1, 2, 3);
        header.csrcs = vec![0xAABB_CCDD, 0x1122_3344];

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), RTP_HEADER_SIZE + 8);
        assert_eq!(bytes[0] & 0x0F, 2);

        let parsed = RtpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.csrcs, header.csrcs);
    }

    #[test]
    fn test_rtp_header_with_extension() {
        let mut header = RtpHeader::new(false, 98, 1, 2, 3);
        header.extension = true;
        header.extension_profile = 0xBEDE;
        header.extension_payload = Bytes::from_static(&[1, 2, 3, 4]);

        let bytes = header.to_bytes();
        let parsed = RtpHeader::from_bytes(&bytes).unwrap();
        assert!(parsed.extension);
        assert_eq!(parsed.extension_profile, 0xBEDE);
        assert_eq!(&parsed.extension_payload[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = RtpPacket::new(
            RtpHeader::new(true, 98, 7, 1000, 42),
            Bytes::from_static(&[0x40, 0x01, 0xAA]),
        );

        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), RTP_HEADER_SIZE + 3);

        let parsed = RtpPacket::from_bytes(bytes).unwrap();
        assert_eq!(parsed.header, packet.header);
        assert_eq!(parsed.payload, packet.payload);
        assert!(parsed.format.is_none());
    }

    #[test]
    fn test_short_input_rejected() {
        assert!(RtpHeader::from_bytes(&[0u8; 11]).is_none());
        assert!(RtpPacket::from_bytes(Bytes::from_static(&[0u8; 5])).is_none());
    }
}
