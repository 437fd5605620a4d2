//! Decoder configuration parsing (ISO/IEC 14496-15 `hvcC` records).

use bytes::Bytes;
use thiserror::Error;

use super::{NAL_TYPE_PPS, NAL_TYPE_SPS, NAL_TYPE_VPS};

/// Length-prefix width assumed when no `hvcC` record is available.
pub const DEFAULT_NAL_LENGTH_SIZE: u8 = 4;

/// The fixed portion of an `hvcC` record before the NAL arrays.
const HVCC_HEADER_SIZE: usize = 23;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("hvcC record too short: {0} bytes")]
    TooShort(usize),

    #[error("unsupported hvcC configuration version {0}")]
    UnsupportedVersion(u8),

    #[error("hvcC record truncated inside NAL array {0}")]
    Truncated(usize),

    #[error("hvcC record carries no {0}")]
    MissingParameterSet(&'static str),
}

/// VPS/SPS/PPS extracted from an `hvcC` configuration record.
///
/// Each set is a raw NAL unit (header + RBSP) without start code or length
/// prefix. `nal_length_size` is the AVCC prefix width the record declares,
/// used wherever a frame payload is split into NAL units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub vps: Bytes,
    pub sps: Bytes,
    pub pps: Bytes,
    pub nal_length_size: u8,
}

impl ParameterSets {
    pub fn new(vps: Bytes, sps: Bytes, pps: Bytes) -> Self {
        Self {
            vps,
            sps,
            pps,
            nal_length_size: DEFAULT_NAL_LENGTH_SIZE,
        }
    }

    /// Parses an `hvcC` decoder configuration record.
    ///
    /// Walks `numOfArrays` NAL arrays starting at byte 23; each array header
    /// is `{reserved|NAL_unit_type(6), numNalus(u16 be)}` followed by
    /// `numNalus` length-prefixed NAL units. The last VPS, SPS and PPS seen
    /// win; all three must be present.
    pub fn from_hvcc(record: &[u8]) -> Result<Self, FormatError> {
        if record.len() < HVCC_HEADER_SIZE {
            return Err(FormatError::TooShort(record.len()));
        }
        if record[0] != 1 {
            return Err(FormatError::UnsupportedVersion(record[0]));
        }

        let nal_length_size = (record[21] & 0x03) + 1;
        let num_arrays = record[22] as usize;

        let mut vps = None;
        let mut sps = None;
        let mut pps = None;

        let mut pos = HVCC_HEADER_SIZE;
        for array in 0..num_arrays {
            if pos + 3 > record.len() {
                return Err(FormatError::Truncated(array));
            }
            let nal_type = record[pos] & 0x3F;
            let num_nalus = u16::from_be_bytes([record[pos + 1], record[pos + 2]]) as usize;
            pos += 3;

            for _ in 0..num_nalus {
                if pos + 2 > record.len() {
                    return Err(FormatError::Truncated(array));
                }
                let len = u16::from_be_bytes([record[pos], record[pos + 1]]) as usize;
                pos += 2;
                if pos + len > record.len() {
                    return Err(FormatError::Truncated(array));
                }
                let nal = Bytes::copy_from_slice(&record[pos..pos + len]);
                pos += len;

                match nal_type {
                    NAL_TYPE_VPS => vps = Some(nal),
                    NAL_TYPE_SPS => sps = Some(nal),
                    NAL_TYPE_PPS => pps = Some(nal),
                    _ => {}
                }
            }
        }

        Ok(Self {
            vps: vps.ok_or(FormatError::MissingParameterSet("VPS"))?,
            sps: sps.ok_or(FormatError::MissingParameterSet("SPS"))?,
            pps: pps.ok_or(FormatError::MissingParameterSet("PPS"))?,
            nal_length_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal hvcC record with the given parameter sets.
    pub(crate) fn build_hvcc(vps: &[u8], sps: &[u8], pps: &[u8], length_size_minus_one: u8) -> Vec<u8> {
        let mut record = vec![0u8; HVCC_HEADER_SIZE];
        record[0] = 1;
        record[21] = 0xFC | (length_size_minus_one & 0x03);
        record[22] = 3;

        for (nal_type, nal) in [(NAL_TYPE_VPS, vps), (NAL_TYPE_SPS, sps), (NAL_TYPE_PPS, pps)] {
            record.push(0x80 | nal_type);
            record.extend_from_slice(&1u16.to_be_bytes());
            record.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            record.extend_from_slice(nal);
        }

        record
    }

    #[test]
    fn test_parse_hvcc() {
        let vps = [0x40, 0x01, 0x0C];
        let sps = [0x42, 0x01, 0x01, 0x02];
        let pps = [0x44, 0x01, 0xC0];
        let record = build_hvcc(&vps, &sps, &pps, 3);

        let sets = ParameterSets::from_hvcc(&record).unwrap();
        assert_eq!(&sets.vps[..], &vps);
        assert_eq!(&sets.sps[..], &sps);
        assert_eq!(&sets.pps[..], &pps);
        assert_eq!(sets.nal_length_size, 4);
    }

    #[test]
    fn test_parse_hvcc_two_byte_prefix() {
        let record = build_hvcc(&[0x40, 0x01], &[0x42, 0x01], &[0x44, 0x01], 1);
        let sets = ParameterSets::from_hvcc(&record).unwrap();
        assert_eq!(sets.nal_length_size, 2);
    }

    #[test]
    fn test_too_short() {
        let result = ParameterSets::from_hvcc(&[1, 2, 3]);
        assert!(matches!(result, Err(FormatError::TooShort(3))));
    }

    #[test]
    fn test_bad_version() {
        let mut record = build_hvcc(&[0x40, 0x01], &[0x42, 0x01], &[0x44, 0x01], 3);
        record[0] = 2;
        let result = ParameterSets::from_hvcc(&record);
        assert!(matches!(result, Err(FormatError::UnsupportedVersion(2))));
    }

    #[test]
    fn test_truncated_array() {
        let record = build_hvcc(&[0x40, 0x01], &[0x42, 0x01], &[0x44, 0x01], 3);
        let result = ParameterSets::from_hvcc(&record[..record.len() - 1]);
        assert!(matches!(result, Err(FormatError::Truncated(_))));
    }

    #[test]
    fn test_missing_pps() {
        let mut record = vec![0u8; HVCC_HEADER_SIZE];
        record[0] = 1;
        record[21] = 0xFF;
        record[22] = 1;
        record.push(0x80 | NAL_TYPE_VPS);
        record.extend_from_slice(&1u16.to_be_bytes());
        record.extend_from_slice(&2u16.to_be_bytes());
        record.extend_from_slice(&[0x40, 0x01]);

        let result = ParameterSets::from_hvcc(&record);
        assert!(matches!(result, Err(FormatError::MissingParameterSet(_))));
    }
}
