//! Network sink statistics

use serde::{Deserialize, Serialize};

/// Counters kept by the RTP/RTCP network sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkStats {
    /// RTP packets put on the wire
    pub packets_sent: u32,

    /// RTP payload bytes put on the wire (headers excluded)
    pub octets_sent: u32,

    /// Packets dropped because the socket was not ready
    pub packets_dropped: u64,

    /// Socket send failures
    pub send_errors: u64,

    /// RTCP sender reports emitted
    pub reports_sent: u64,
}

impl SinkStats {
    /// Packet rate over the delta to a previous snapshot.
    pub fn packet_rate(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let delta = self.packets_sent.wrapping_sub(previous.packets_sent);
        delta as f64 / elapsed_secs
    }

    /// Payload bitrate in kbps over the delta to a previous snapshot.
    pub fn bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let delta = self.octets_sent.wrapping_sub(previous.octets_sent);
        (delta as f64 * 8.0) / elapsed_secs / 1000.0
    }
}
