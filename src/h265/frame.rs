//! Encoded-frame value types and their inter-process wire form.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::param_sets::{ParameterSets, DEFAULT_NAL_LENGTH_SIZE};

/// Rational media time: `value / timescale` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: u32,
}

impl MediaTime {
    pub const fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    pub fn seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }

    pub fn from_seconds(seconds: f64, timescale: u32) -> Self {
        Self {
            value: (seconds * timescale as f64).round() as i64,
            timescale,
        }
    }
}

/// One encoded H.265 access unit in AVCC form.
#[derive(Debug, Clone)]
pub struct EncodedH265Frame {
    /// Length-prefixed NAL units.
    pub payload: Bytes,
    pub pts: MediaTime,
    pub duration: MediaTime,
    pub is_keyframe: bool,
    /// Decoder configuration, present at least on keyframes.
    pub format: Option<ParameterSets>,
}

impl EncodedH265Frame {
    /// Width of this frame's AVCC length prefixes.
    pub fn nal_length_size(&self) -> usize {
        self.format
            .as_ref()
            .map(|f| f.nal_length_size as usize)
            .unwrap_or(DEFAULT_NAL_LENGTH_SIZE as usize)
    }

    pub fn to_wire(&self) -> EncodedFrameWire {
        EncodedFrameWire {
            data: self.payload.to_vec(),
            timestamp_seconds: self.pts.seconds(),
            timestamp_timescale: self.pts.timescale,
            duration_seconds: self.duration.seconds(),
            duration_timescale: self.duration.timescale,
            is_key_frame: self.is_keyframe,
            parameter_sets: self.format.as_ref().map(|f| ParameterSetsWire {
                vps: f.vps.to_vec(),
                sps: f.sps.to_vec(),
                pps: f.pps.to_vec(),
            }),
        }
    }

    pub fn from_wire(wire: EncodedFrameWire) -> Self {
        Self {
            payload: Bytes::from(wire.data),
            pts: MediaTime::from_seconds(wire.timestamp_seconds, wire.timestamp_timescale),
            duration: MediaTime::from_seconds(wire.duration_seconds, wire.duration_timescale),
            is_keyframe: wire.is_key_frame,
            format: wire.parameter_sets.map(|p| {
                ParameterSets::new(Bytes::from(p.vps), Bytes::from(p.sps), Bytes::from(p.pps))
            }),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_wire())
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<EncodedFrameWire>(data).map(Self::from_wire)
    }
}

/// Keyed wire structure for transferring encoded frames between processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedFrameWire {
    pub data: Vec<u8>,
    pub timestamp_seconds: f64,
    pub timestamp_timescale: u32,
    pub duration_seconds: f64,
    pub duration_timescale: u32,
    pub is_key_frame: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_sets: Option<ParameterSetsWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSetsWire {
    pub vps: Vec<u8>,
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}
