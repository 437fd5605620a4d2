//! H.265 (HEVC) elementary-stream types shared by the codec and RTP layers.
//!
//! Frames travel in AVCC form: every NAL unit is preceded by a big-endian
//! length prefix whose width comes from the `hvcC` configuration record
//! (4 bytes when no record is available).

mod frame;
mod param_sets;

pub use frame::{EncodedFrameWire, EncodedH265Frame, MediaTime, ParameterSetsWire};
pub use param_sets::{FormatError, ParameterSets, DEFAULT_NAL_LENGTH_SIZE};

use bytes::Bytes;
use tracing::warn;

/// Parameter-set NAL unit types (ITU-T H.265 Table 7-1).
pub const NAL_TYPE_VPS: u8 = 32;
pub const NAL_TYPE_SPS: u8 = 33;
pub const NAL_TYPE_PPS: u8 = 34;

// https://datatracker.ietf.org/doc/html/rfc7798#section-4.4.2
pub const NAL_TYPE_AP: u8 = 48;
// https://datatracker.ietf.org/doc/html/rfc7798#section-4.4.3
pub const NAL_TYPE_FU: u8 = 49;
// https://datatracker.ietf.org/doc/html/rfc7798#section-4.4.4
pub const NAL_TYPE_PACI: u8 = 50;

/// Every H.265 NAL unit starts with a 2-byte header.
pub const NAL_HEADER_SIZE: usize = 2;

/// NAL types whose presence marks an access unit as a sync point.
const KEYFRAME_NAL_TYPES: [u8; 5] = [19, 20, 39, 40, 41];

/// Extracts the 6-bit `nal_unit_type` from the first header byte.
#[inline]
pub fn nal_unit_type(first_byte: u8) -> u8 {
    (first_byte >> 1) & 0x3F
}

#[inline]
pub fn is_keyframe_nal(nal_type: u8) -> bool {
    KEYFRAME_NAL_TYPES.contains(&nal_type)
}

/// Splits an AVCC buffer into its NAL units.
///
/// `length_size` is the byte width of each length prefix (1–4; anything else
/// falls back to 4). Zero-length entries are skipped and a declared length
/// that overruns the buffer discards the remainder, both with a warning.
pub fn split_avcc(payload: &Bytes, length_size: usize) -> Vec<Bytes> {
    let length_size = if (1..=4).contains(&length_size) {
        length_size
    } else {
        warn!(length_size, "invalid NAL length prefix width, assuming 4");
        4
    };

    let mut nals = Vec::new();
    let mut pos = 0usize;
    let total = payload.len();

    while pos < total {
        if pos + length_size > total {
            warn!(
                trailing = total - pos,
                "trailing bytes shorter than a length prefix, discarding"
            );
            break;
        }

        let mut declared = 0usize;
        for i in 0..length_size {
            declared = (declared << 8) | payload[pos + i] as usize;
        }
        pos += length_size;

        if declared == 0 {
            warn!("skipping zero-length NAL unit");
            continue;
        }
        if declared > total - pos {
            warn!(
                declared,
                remaining = total - pos,
                "NAL length overruns frame, discarding remainder"
            );
            break;
        }

        nals.push(payload.slice(pos..pos + declared));
        pos += declared;
    }

    nals
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn avcc(nals: &[&[u8]]) -> Bytes {
        let mut buf = bytes::BytesMut::new();
        for nal in nals {
            buf.put_u32(nal.len() as u32);
            buf.put_slice(nal);
        }
        buf.freeze()
    }

    #[test]
    fn test_nal_unit_type() {
        // 0x40 >> 1 = 32 (VPS), 0x26 >> 1 = 19 (IDR_W_RADL)
        assert_eq!(nal_unit_type(0x40), NAL_TYPE_VPS);
        assert_eq!(nal_unit_type(0x26), 19);
    }

    #[test]
    fn test_split_avcc_multiple_nals() {
        let payload = avcc(&[&[0x40, 0x01, 0xAA], &[0x42, 0x01, 0xBB, 0xCC]]);
        let nals = split_avcc(&payload, 4);

        assert_eq!(nals.len(), 2);
        assert_eq!(&nals[0][..], &[0x40, 0x01, 0xAA]);
        assert_eq!(&nals[1][..], &[0x42, 0x01, 0xBB, 0xCC]);
    }

    #[test]
    fn test_split_avcc_two_byte_prefix() {
        let payload = Bytes::from_static(&[0x00, 0x03, 0x40, 0x01, 0xAA]);
        let nals = split_avcc(&payload, 2);

        assert_eq!(nals.len(), 1);
        assert_eq!(&nals[0][..], &[0x40, 0x01, 0xAA]);
    }

    #[test]
    fn test_split_avcc_skips_zero_length() {
        let payload = avcc(&[&[], &[0x40, 0x01]]);
        let nals = split_avcc(&payload, 4);

        assert_eq!(nals.len(), 1);
        assert_eq!(&nals[0][..], &[0x40, 0x01]);
    }

    #[test]
    fn test_split_avcc_overrun_discards_remainder() {
        let payload = Bytes::from_static(&[0x00, 0x00, 0x00, 0xFF, 0x40, 0x01]);
        let nals = split_avcc(&payload, 4);
        assert!(nals.is_empty());
    }

    #[test]
    fn test_keyframe_nal_types() {
        assert!(is_keyframe_nal(19));
        assert!(is_keyframe_nal(20));
        assert!(!is_keyframe_nal(1));
        assert!(!is_keyframe_nal(NAL_TYPE_VPS));
    }
}
