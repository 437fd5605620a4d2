//! H.265 RTP payloading (RFC 7798) on top of RFC 3550 packets.
//!
//! [`H265Packetizer`] fragments AVCC frames into single-NAL and FU packets;
//! [`H265Depacketizer`] reverses the process, reassembling frames by
//! timestamp.

mod depacketizer;
mod packet;
mod packetizer;

pub use depacketizer::{H265Depacketizer, DEFAULT_BACKLOG};
pub use packet::{RtpHeader, RtpPacket};
pub use packetizer::{H265Packetizer, PacketizerStats};

use thiserror::Error;

/// RTP protocol constants
pub const RTP_VERSION: u8 = 2;
pub const RTP_PAYLOAD_TYPE_H265: u8 = 98;
pub const RTP_HEADER_SIZE: usize = 12;
pub const RTP_CLOCK_RATE: u32 = 90_000; // Standard 90kHz clock for video
pub const DEFAULT_MAX_PAYLOAD: usize = 1400;

/// PayloadHdr (2 bytes) plus FU header (1 byte) spent on every fragment.
pub const FU_OVERHEAD: usize = 3;

#[derive(Error, Debug)]
pub enum PacketizerError {
    #[error("empty frame payload")]
    EmptyFrame,

    #[error("frame contains no usable NAL units")]
    NoNalUnits,

    #[error("max payload of {0} bytes cannot fit a fragment")]
    InvalidMaxPayload(usize),
}
