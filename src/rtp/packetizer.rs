//! RTP/H.265 packetization according to RFC 7798.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::h265::{nal_unit_type, split_avcc, EncodedH265Frame, NAL_HEADER_SIZE, NAL_TYPE_FU};

use super::{
    PacketizerError, RtpHeader, RtpPacket, DEFAULT_MAX_PAYLOAD, FU_OVERHEAD, RTP_CLOCK_RATE,
    RTP_PAYLOAD_TYPE_H265,
};

/// Statistics for the RTP packetizer, the RTCP sender-report inputs among
/// them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketizerStats {
    pub packet_count: u32,
    pub octet_count: u32,
    pub frames_sent: u64,
    pub current_seq: u16,
}

/// RTP/H.265 packetizer
///
/// Fragments encoded AVCC frames into RTP packets: NAL units that fit the
/// payload cap travel verbatim, larger ones as Fragmentation Units (FUs).
/// Sequence and statistics state is atomic so a shared packetizer needs no
/// outer lock.
pub struct H265Packetizer {
    payload_type: u8,
    ssrc: u32,
    max_payload: usize,

    sequence_number: AtomicU32,

    packet_count: AtomicU32,
    octet_count: AtomicU32,
    frames_sent: AtomicU64,
}

impl H265Packetizer {
    /// Creates a new packetizer.
    ///
    /// # Arguments
    /// * `ssrc` - Synchronization source identifier (unique per stream)
    /// * `max_payload` - RTP payload cap in bytes (0 selects the default)
    pub fn new(ssrc: u32, max_payload: usize) -> Self {
        let max_payload = if max_payload == 0 {
            DEFAULT_MAX_PAYLOAD
        } else {
            max_payload
        };

        Self {
            payload_type: RTP_PAYLOAD_TYPE_H265,
            ssrc,
            max_payload,
            sequence_number: AtomicU32::new(0),
            packet_count: AtomicU32::new(0),
            octet_count: AtomicU32::new(0),
            frames_sent: AtomicU64::new(0),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Packetizes one encoded frame into RTP packets.
    ///
    /// Every packet of the frame carries the same timestamp; the marker bit
    /// is set only on the last packet. Sequence numbers continue from the
    /// previous frame, wrapping modulo 2^16.
    pub fn packetize(&self, frame: &EncodedH265Frame) -> Result<Vec<RtpPacket>, PacketizerError> {
        if frame.payload.is_empty() {
            return Err(PacketizerError::EmptyFrame);
        }
        if self.max_payload <= FU_OVERHEAD {
            return Err(PacketizerError::InvalidMaxPayload(self.max_payload));
        }

        let mut nals = split_avcc(&frame.payload, frame.nal_length_size());
        nals.retain(|nal| {
            if nal.len() < NAL_HEADER_SIZE {
                warn!(len = nal.len(), "skipping NAL unit shorter than its header");
                return false;
            }
            true
        });
        if nals.is_empty() {
            return Err(PacketizerError::NoNalUnits);
        }

        let timestamp = Self::rtp_timestamp(frame.pts.seconds());
        let fragment_size = self.max_payload - FU_OVERHEAD;

        // Precompute the packet total so the marker lands on the frame's
        // final packet, not the final packet of each NAL.
        let total_packets: usize = nals
            .iter()
            .map(|nal| {
                if nal.len() <= self.max_payload {
                    1
                } else {
                    (nal.len() - NAL_HEADER_SIZE).div_ceil(fragment_size)
                }
            })
            .sum();

        let mut packets = Vec::with_capacity(total_packets);
        let mut seq = self.sequence_number.load(Ordering::Relaxed);
        let mut ordinal = 0usize;

        for nal in &nals {
            if nal.len() <= self.max_payload {
                ordinal += 1;
                packets.push(self.build_packet(
                    seq as u16,
                    timestamp,
                    ordinal == total_packets,
                    nal.clone(),
                    frame,
                ));
                seq = seq.wrapping_add(1) & 0xFFFF;
                continue;
            }

            // FU, RFC 7798 section 4.4.3: the 2-byte NAL header is consumed
            // once and replaced by PayloadHdr (type 49, layer/TID preserved)
            // plus a 1-byte FU header on every fragment.
            let nal_type = nal_unit_type(nal[0]);
            let payload_hdr_hi = (NAL_TYPE_FU << 1) | (nal[0] & 0x01);
            let payload_hdr_lo = nal[1];
            let body = nal.slice(NAL_HEADER_SIZE..);

            let mut offset = 0usize;
            let mut first = true;
            while offset < body.len() {
                let end = (offset + fragment_size).min(body.len());
                let last = end == body.len();

                let mut payload = BytesMut::with_capacity(FU_OVERHEAD + end - offset);
                payload.put_u8(payload_hdr_hi);
                payload.put_u8(payload_hdr_lo);
                payload.put_u8(
                    ((first as u8) << 7) | ((last as u8) << 6) | nal_type,
                );
                payload.put_slice(&body[offset..end]);

                ordinal += 1;
                packets.push(self.build_packet(
                    seq as u16,
                    timestamp,
                    ordinal == total_packets,
                    payload.freeze(),
                    frame,
                ));
                seq = seq.wrapping_add(1) & 0xFFFF;

                offset = end;
                first = false;
            }
        }

        let octets: usize = packets.iter().map(|p| p.payload.len()).sum();

        self.sequence_number.store(seq, Ordering::Relaxed);
        self.packet_count
            .fetch_add(packets.len() as u32, Ordering::Relaxed);
        self.octet_count.fetch_add(octets as u32, Ordering::Relaxed);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);

        Ok(packets)
    }

    fn build_packet(
        &self,
        seq: u16,
        timestamp: u32,
        marker: bool,
        payload: Bytes,
        frame: &EncodedH265Frame,
    ) -> RtpPacket {
        RtpPacket {
            header: RtpHeader::new(marker, self.payload_type, seq, timestamp, self.ssrc),
            payload,
            format: frame.format.clone(),
        }
    }

    /// Maps a presentation time to the 90 kHz RTP clock, modulo 2^32.
    fn rtp_timestamp(pts_seconds: f64) -> u32 {
        (pts_seconds * RTP_CLOCK_RATE as f64).round() as i64 as u32
    }

    /// Overrides the next sequence number (useful for tests and handover).
    pub fn set_sequence_number(&self, seq: u16) {
        self.sequence_number.store(seq as u32, Ordering::Relaxed);
    }

    /// Gets packetizer statistics.
    pub fn stats(&self) -> PacketizerStats {
        PacketizerStats {
            packet_count: self.packet_count.load(Ordering::Relaxed),
            octet_count: self.octet_count.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            current_seq: self.sequence_number.load(Ordering::Relaxed) as u16,
        }
    }

    /// Resets sequence and statistics state.
    pub fn reset(&self) {
        self.sequence_number.store(0, Ordering::Relaxed);
        self.packet_count.store(0, Ordering::Relaxed);
        self.octet_count.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
    }
}
