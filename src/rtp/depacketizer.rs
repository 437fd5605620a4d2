//! RTP/H.265 depacketization: frame reassembly by timestamp.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::h265::{
    is_keyframe_nal, nal_unit_type, EncodedH265Frame, MediaTime, ParameterSets, NAL_HEADER_SIZE,
    NAL_TYPE_AP, NAL_TYPE_FU, NAL_TYPE_PACI,
};

use super::{RtpPacket, FU_OVERHEAD, RTP_CLOCK_RATE};

/// Open timestamps kept before the oldest incomplete frame is dropped.
pub const DEFAULT_BACKLOG: usize = 10;

/// Assumed frame duration when the sender supplies none (1/30 s).
const DEFAULT_FRAME_DURATION: MediaTime = MediaTime::new(3000, RTP_CLOCK_RATE);

struct PendingPacket {
    seq: u16,
    payload: Bytes,
}

/// RTP/H.265 depacketizer
///
/// Collects packets per timestamp, stitches Fragmentation Units back into
/// NAL units and emits reassembled AVCC frames. A frame is assembled when
/// its marker packet arrives; incomplete frames beyond the backlog bound
/// are dropped.
pub struct H265Depacketizer {
    pending: BTreeMap<u32, Vec<PendingPacket>>,
    last_seq: Option<u16>,
    format: Option<ParameterSets>,
    backlog: usize,
}

impl H265Depacketizer {
    pub fn new() -> Self {
        Self::with_backlog(DEFAULT_BACKLOG)
    }

    pub fn with_backlog(backlog: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            last_seq: None,
            format: None,
            backlog: backlog.max(1),
        }
    }

    /// Feeds one packet, returning any frames completed by it.
    pub fn push(&mut self, packet: &RtpPacket) -> Vec<EncodedH265Frame> {
        if self.format.is_none() {
            self.format = packet.format.clone();
        }

        let timestamp = packet.header.timestamp;
        let seq = packet.header.sequence_number;

        if let Some(last) = self.last_seq {
            let expected = last.wrapping_add(1);
            if seq != expected && self.pending.contains_key(&timestamp) {
                warn!(timestamp, expected, got = seq, "sequence gap within frame");
            }
        }
        self.last_seq = Some(seq);

        self.pending.entry(timestamp).or_default().push(PendingPacket {
            seq,
            payload: packet.payload.clone(),
        });

        let mut frames = Vec::new();
        if packet.header.marker {
            if let Some(packets) = self.pending.remove(&timestamp) {
                frames.extend(self.assemble(timestamp, packets));
            }
        }

        while self.pending.len() > self.backlog {
            if let Some((&oldest, _)) = self.pending.iter().next() {
                self.pending.remove(&oldest);
                warn!(timestamp = oldest, "dropping stale incomplete frame");
            }
        }

        frames
    }

    /// Assembles and returns every remaining timestamp in ascending order,
    /// leaving the depacketizer empty.
    pub fn finish(&mut self) -> Vec<EncodedH265Frame> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter_map(|(timestamp, packets)| self.assemble(timestamp, packets))
            .collect()
    }

    fn assemble(&self, timestamp: u32, mut packets: Vec<PendingPacket>) -> Option<EncodedH265Frame> {
        packets.sort_by_key(|p| p.seq);

        let mut nals: Vec<Bytes> = Vec::new();
        let mut accumulator: Option<BytesMut> = None;

        for packet in &packets {
            let payload = &packet.payload;
            if payload.len() < NAL_HEADER_SIZE {
                warn!(timestamp, len = payload.len(), "payload shorter than a NAL header");
                continue;
            }

            let nal_type = nal_unit_type(payload[0]);
            match nal_type {
                0..=47 => {
                    if accumulator.take().is_some() {
                        warn!(timestamp, "discarding unterminated fragmented NAL");
                    }
                    nals.push(payload.clone());
                }
                NAL_TYPE_FU => {
                    if payload.len() < FU_OVERHEAD {
                        warn!(timestamp, "fragmentation unit without FU header");
                        continue;
                    }
                    let fu_header = payload[2];
                    let start = fu_header & 0x80 != 0;
                    let end = fu_header & 0x40 != 0;
                    let fu_type = fu_header & 0x3F;

                    if start {
                        if accumulator.is_some() {
                            warn!(timestamp, "discarding unterminated fragmented NAL");
                        }
                        // Rebuild the original 2-byte NAL header from the
                        // FU type plus the PayloadHdr's layer/TID bits.
                        let mut acc = BytesMut::new();
                        acc.put_u8((fu_type << 1) | (payload[0] & 0x01));
                        acc.put_u8(payload[1]);
                        accumulator = Some(acc);
                    }

                    match accumulator.as_mut() {
                        Some(acc) => acc.put_slice(&payload[FU_OVERHEAD..]),
                        None => {
                            warn!(timestamp, "fragment without a start bit, discarding");
                            continue;
                        }
                    }

                    if end {
                        if let Some(acc) = accumulator.take() {
                            nals.push(acc.freeze());
                        }
                    }
                }
                NAL_TYPE_AP | NAL_TYPE_PACI => {
                    warn!(timestamp, nal_type, "unsupported payload structure, skipping");
                }
                _ => {
                    warn!(timestamp, nal_type, "unknown payload type, skipping");
                }
            }
        }

        if accumulator.is_some() {
            warn!(timestamp, "discarding unterminated fragmented NAL at frame end");
        }

        if nals.is_empty() {
            return None;
        }

        let is_keyframe = nals.iter().any(|nal| is_keyframe_nal(nal_unit_type(nal[0])));

        let total: usize = nals.iter().map(|nal| 4 + nal.len()).sum();
        let mut payload = BytesMut::with_capacity(total);
        for nal in &nals {
            payload.put_u32(nal.len() as u32);
            payload.put_slice(nal);
        }

        Some(EncodedH265Frame {
            payload: payload.freeze(),
            pts: MediaTime::new(timestamp as i64, RTP_CLOCK_RATE),
            duration: DEFAULT_FRAME_DURATION,
            is_keyframe,
            format: self.format.clone(),
        })
    }
}

impl Default for H265Depacketizer {
    fn default() -> Self {
        Self::new()
    }
}
