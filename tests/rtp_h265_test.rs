//! End-to-end tests for the H.265 RTP engine: packetization layout,
//! reassembly round-trips and parameter-set handling.

use bytes::{BufMut, Bytes, BytesMut};

use rust_h265_rtp::h265::{
    nal_unit_type, EncodedH265Frame, MediaTime, ParameterSets, NAL_TYPE_FU,
};
use rust_h265_rtp::rtp::{
    H265Depacketizer, H265Packetizer, RtpPacket, RTP_PAYLOAD_TYPE_H265, RTP_VERSION,
};

/// Wraps raw NAL units into a 4-byte length-prefixed AVCC payload.
fn avcc(nals: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::new();
    for nal in nals {
        buf.put_u32(nal.len() as u32);
        buf.put_slice(nal);
    }
    buf.freeze()
}

fn frame(payload: Bytes, pts_ticks: i64, keyframe: bool) -> EncodedH265Frame {
    EncodedH265Frame {
        payload,
        pts: MediaTime::new(pts_ticks, 90_000),
        duration: MediaTime::new(3000, 90_000),
        is_keyframe: keyframe,
        format: None,
    }
}

#[test]
fn test_single_nal_packetize() {
    let p = H265Packetizer::new(0x1234_5678, 1400);

    // One NAL of length 5 starting 0x40 0x01 (nal_type 32, VPS).
    let input = frame(
        Bytes::from_static(&[0x00, 0x00, 0x00, 0x05, 0x40, 0x01, 0xAA, 0xBB, 0xCC]),
        45_000,
        false,
    );

    let packets = p.packetize(&input).unwrap();
    assert_eq!(packets.len(), 1);

    let pkt = &packets[0];
    assert_eq!(&pkt.payload[..], &[0x40, 0x01, 0xAA, 0xBB, 0xCC]);
    assert!(pkt.header.marker);
    assert_eq!(pkt.header.sequence_number, 0);
    assert_eq!(pkt.header.timestamp, 45_000);
    assert_eq!(pkt.header.payload_type, RTP_PAYLOAD_TYPE_H265);
    assert_eq!(nal_unit_type(pkt.payload[0]), 32);
}

fn fragmented_frame() -> (Vec<u8>, EncodedH265Frame) {
    // 3000-byte NAL: 2-byte header (type 19) + 2998 body bytes.
    let mut nal = vec![0x26, 0x01];
    nal.extend((0..2998u32).map(|i| (i % 251) as u8));
    let encoded = frame(avcc(&[&nal]), 0, true);
    (nal, encoded)
}

#[test]
fn test_fragmented_nal_packetize() {
    let p = H265Packetizer::new(1, 1400);
    let (nal, input) = fragmented_frame();

    let packets = p.packetize(&input).unwrap();
    assert_eq!(packets.len(), 3);

    let orig_type = nal_unit_type(nal[0]);
    for (i, pkt) in packets.iter().enumerate() {
        // PayloadHdr: FU type with the original layer/TID bits.
        assert_eq!(nal_unit_type(pkt.payload[0]), NAL_TYPE_FU);
        assert_eq!(pkt.payload[0] & 0x01, nal[0] & 0x01);
        assert_eq!(pkt.payload[1], nal[1]);
        assert_eq!(pkt.payload[2] & 0x3F, orig_type);

        // All packets of the burst share the frame timestamp.
        assert_eq!(pkt.header.timestamp, packets[0].header.timestamp);
        assert_eq!(pkt.header.sequence_number, i as u16);
    }

    // S only on the first fragment, E only on the last.
    assert_eq!(packets[0].payload[2] & 0xC0, 0x80);
    assert_eq!(packets[1].payload[2] & 0xC0, 0x00);
    assert_eq!(packets[2].payload[2] & 0xC0, 0x40);

    // 2998 body bytes as 1397 + 1397 + 204.
    assert_eq!(packets[0].payload.len(), 1400);
    assert_eq!(packets[1].payload.len(), 1400);
    assert_eq!(packets[2].payload.len(), 3 + 204);

    // Exactly one marker, on the last packet.
    let markers: Vec<bool> = packets.iter().map(|p| p.header.marker).collect();
    assert_eq!(markers, vec![false, false, true]);
}

#[test]
fn test_depacketize_reassembles_fragments() {
    let p = H265Packetizer::new(1, 1400);
    let (nal, input) = fragmented_frame();

    let packets = p.packetize(&input).unwrap();

    let mut d = H265Depacketizer::new();
    let mut frames = Vec::new();
    for pkt in &packets {
        frames.extend(d.push(pkt));
    }

    assert_eq!(frames.len(), 1);
    let rebuilt = &frames[0];

    // AVCC length prefix plus the original 3000 NAL bytes.
    assert_eq!(rebuilt.payload.len(), 4 + nal.len());
    assert_eq!(&rebuilt.payload[..4], &(nal.len() as u32).to_be_bytes());
    assert_eq!(&rebuilt.payload[4..], &nal[..]);
    assert!(rebuilt.is_keyframe);
}

#[test]
fn test_multi_nal_roundtrip() {
    let p = H265Packetizer::new(9, 1400);

    let vps = [0x40, 0x01, 0x0C];
    let idr = {
        let mut nal = vec![0x26, 0x01];
        nal.extend((0..4000u32).map(|i| (i % 199) as u8));
        nal
    };
    let payload = avcc(&[&vps, &idr]);
    let input = frame(payload.clone(), 6000, true);

    let packets = p.packetize(&input).unwrap();
    // 1 single-NAL packet + ceil(4000 / 1397) fragments
    assert_eq!(packets.len(), 1 + 3);

    // Contiguous sequence numbers, one marker at the end.
    for window in packets.windows(2) {
        assert_eq!(
            window[1].header.sequence_number,
            window[0].header.sequence_number.wrapping_add(1)
        );
    }
    assert_eq!(
        packets.iter().filter(|p| p.header.marker).count(),
        1
    );
    assert!(packets.last().unwrap().header.marker);

    let mut d = H265Depacketizer::new();
    let mut frames = Vec::new();
    for pkt in &packets {
        frames.extend(d.push(pkt));
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, payload);
    assert!(frames[0].is_keyframe);
    assert_eq!(frames[0].pts.value, 6000);
}

#[test]
fn test_keyframe_flag_preserved() {
    let p = H265Packetizer::new(1, 1400);
    let mut d = H265Depacketizer::new();

    // Non-key slice (type 1).
    let plain = frame(avcc(&[&[0x02, 0x01, 0x11, 0x22]]), 3000, false);
    let frames: Vec<_> = p
        .packetize(&plain)
        .unwrap()
        .iter()
        .flat_map(|pkt| d.push(pkt))
        .collect();
    assert!(!frames[0].is_keyframe);

    // IDR slice (type 19).
    let idr = frame(avcc(&[&[0x26, 0x01, 0x33]]), 6000, true);
    let frames: Vec<_> = p
        .packetize(&idr)
        .unwrap()
        .iter()
        .flat_map(|pkt| d.push(pkt))
        .collect();
    assert!(frames[0].is_keyframe);
}

#[test]
fn test_sequence_contiguous_across_wrap() {
    let p = H265Packetizer::new(1, 1400);
    p.set_sequence_number(0xFFFE);

    let (_, input) = fragmented_frame();
    let packets = p.packetize(&input).unwrap();

    let seqs: Vec<u16> = packets.iter().map(|p| p.header.sequence_number).collect();
    assert_eq!(seqs, vec![0xFFFE, 0xFFFF, 0x0000]);
}

#[test]
fn test_format_travels_with_packets() {
    let sets = ParameterSets::new(
        Bytes::from_static(&[0x40, 0x01, 0x0C]),
        Bytes::from_static(&[0x42, 0x01, 0x01]),
        Bytes::from_static(&[0x44, 0x01, 0xC0]),
    );

    let p = H265Packetizer::new(1, 1400);
    let mut input = frame(avcc(&[&[0x26, 0x01, 0xAA]]), 0, true);
    input.format = Some(sets.clone());

    let packets = p.packetize(&input).unwrap();
    assert!(packets.iter().all(|pkt| pkt.format.is_some()));

    let mut d = H265Depacketizer::new();
    let frames: Vec<_> = packets.iter().flat_map(|pkt| d.push(pkt)).collect();

    let latched = frames[0].format.as_ref().unwrap();
    assert_eq!(latched.vps, sets.vps);
    assert_eq!(latched.sps, sets.sps);
    assert_eq!(latched.pps, sets.pps);

    // Frames arriving after the latch keep the format even without one.
    let bare = frame(avcc(&[&[0x02, 0x01, 0xBB]]), 3000, false);
    let frames: Vec<_> = p
        .packetize(&bare)
        .unwrap()
        .iter()
        .flat_map(|pkt| d.push(pkt))
        .collect();
    assert!(frames[0].format.is_some());
}

#[test]
fn test_hvcc_length_size_drives_avcc_parsing() {
    // hvcC declaring 2-byte length prefixes.
    let sets = {
        let record = build_hvcc(&[0x40, 0x01], &[0x42, 0x01], &[0x44, 0x01], 1);
        ParameterSets::from_hvcc(&record).unwrap()
    };
    assert_eq!(sets.nal_length_size, 2);

    let mut payload = BytesMut::new();
    payload.put_u16(3);
    payload.put_slice(&[0x26, 0x01, 0xAA]);

    let mut input = frame(payload.freeze(), 0, true);
    input.format = Some(sets);

    let p = H265Packetizer::new(1, 1400);
    let packets = p.packetize(&input).unwrap();
    assert_eq!(packets.len(), 1);
    assert_eq!(&packets[0].payload[..], &[0x26, 0x01, 0xAA]);
}

/// Builds a minimal hvcC record holding one VPS, SPS and PPS.
fn build_hvcc(vps: &[u8], sps: &[u8], pps: &[u8], length_size_minus_one: u8) -> Vec<u8> {
    let mut record = vec![0u8; 23];
    record[0] = 1;
    record[21] = 0xFC | (length_size_minus_one & 0x03);
    record[22] = 3;

    for (nal_type, nal) in [(32u8, vps), (33, sps), (34, pps)] {
        record.push(0x80 | nal_type);
        record.extend_from_slice(&1u16.to_be_bytes());
        record.extend_from_slice(&(nal.len() as u16).to_be_bytes());
        record.extend_from_slice(nal);
    }

    record
}

#[test]
fn test_hvcc_parse_extracts_all_sets() {
    let vps = [0x40, 0x01, 0x0C, 0x01];
    let sps = [0x42, 0x01, 0x01, 0x02, 0x03];
    let pps = [0x44, 0x01, 0xC0];

    let record = build_hvcc(&vps, &sps, &pps, 3);
    let sets = ParameterSets::from_hvcc(&record).unwrap();

    assert_eq!(&sets.vps[..], &vps);
    assert_eq!(&sets.sps[..], &sps);
    assert_eq!(&sets.pps[..], &pps);
    assert_eq!(sets.nal_length_size, 4);
}

#[test]
fn test_frame_wire_roundtrip_preserves_parameter_sets() {
    let sets = ParameterSets::new(
        Bytes::from_static(&[0x40, 0x01, 0x0C]),
        Bytes::from_static(&[0x42, 0x01, 0x01]),
        Bytes::from_static(&[0x44, 0x01, 0xC0]),
    );
    let mut input = frame(avcc(&[&[0x26, 0x01, 0xAA]]), 9000, true);
    input.format = Some(sets.clone());

    let decoded = EncodedH265Frame::from_json(&input.to_json().unwrap()).unwrap();

    assert_eq!(decoded.payload, input.payload);
    assert!(decoded.is_keyframe);
    let roundtripped = decoded.format.unwrap();
    assert_eq!(roundtripped.vps, sets.vps);
    assert_eq!(roundtripped.sps, sets.sps);
    assert_eq!(roundtripped.pps, sets.pps);
}

#[test]
fn test_rtp_wire_header_layout() {
    let p = H265Packetizer::new(0xCAFE_BABE, 1400);
    let input = frame(avcc(&[&[0x40, 0x01, 0xAA]]), 45_000, false);

    let bytes = p.packetize(&input).unwrap()[0].to_bytes();

    assert_eq!(bytes[0] >> 6, RTP_VERSION);
    assert_eq!(bytes[1] & 0x7F, RTP_PAYLOAD_TYPE_H265);
    assert_eq!(bytes[1] & 0x80, 0x80); // marker
    assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 0);
    assert_eq!(
        u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        45_000
    );
    assert_eq!(
        u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        0xCAFE_BABE
    );

    let parsed = RtpPacket::from_bytes(bytes).unwrap();
    assert_eq!(&parsed.payload[..], &[0x40, 0x01, 0xAA]);
}
