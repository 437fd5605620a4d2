//! RTCP Sender Reports (RFC 3550 Section 6.4.1), fixed 28-byte form with
//! zero report blocks.

/// Seconds between the NTP epoch (1900) and the unix epoch (1970).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

pub const RTCP_PT_SENDER_REPORT: u8 = 200;
pub const SENDER_REPORT_SIZE: usize = 28;

/// Length field in 32-bit words minus one.
const SENDER_REPORT_LEN_WORDS: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_seconds: u32,
    pub ntp_fraction: u32,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    /// Builds a report for the given unix wallclock second.
    pub fn at_wallclock(
        ssrc: u32,
        unix_seconds: u64,
        clock_rate: u32,
        packet_count: u32,
        octet_count: u32,
    ) -> Self {
        Self {
            ssrc,
            ntp_seconds: (unix_seconds + NTP_UNIX_OFFSET) as u32,
            ntp_fraction: 0,
            rtp_timestamp: (unix_seconds * clock_rate as u64) as u32,
            packet_count,
            octet_count,
        }
    }

    pub fn to_bytes(&self) -> [u8; SENDER_REPORT_SIZE] {
        let mut bytes = [0u8; SENDER_REPORT_SIZE];

        bytes[0] = 0x80; // V=2, P=0, RC=0
        bytes[1] = RTCP_PT_SENDER_REPORT;
        bytes[2..4].copy_from_slice(&SENDER_REPORT_LEN_WORDS.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.ssrc.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.ntp_seconds.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.ntp_fraction.to_be_bytes());
        bytes[16..20].copy_from_slice(&self.rtp_timestamp.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.packet_count.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.octet_count.to_be_bytes());

        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < SENDER_REPORT_SIZE {
            return None;
        }
        if data[0] >> 6 != 2 || data[1] != RTCP_PT_SENDER_REPORT {
            return None;
        }
        if u16::from_be_bytes([data[2], data[3]]) != SENDER_REPORT_LEN_WORDS {
            return None;
        }

        let word = |offset: usize| {
            u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
        };

        Some(Self {
            ssrc: word(4),
            ntp_seconds: word(8),
            ntp_fraction: word(12),
            rtp_timestamp: word(16),
            packet_count: word(20),
            octet_count: word(24),
        })
    }
}
