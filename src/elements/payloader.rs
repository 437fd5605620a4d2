//! Pipeline element wrapping the RTP packetizer.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::h265::EncodedH265Frame;
use crate::pipeline::{
    buffer, downcast, AnyBuffer, BufferStream, BufferType, Element, ElementError, ElementKind,
    Filter, PadRef, PipelineError, PipelineHandle, Sink, Source,
};
use crate::rtp::{H265Packetizer, PacketizerStats, RtpPacket};

/// Filter turning [`EncodedH265Frame`] buffers into [`RtpPacket`] bursts.
///
/// Frames the packetizer rejects are dropped with a warning; the edge keeps
/// running.
pub struct H265Payloader {
    id: String,
    packetizer: H265Packetizer,
    tx: mpsc::Sender<AnyBuffer>,
    rx: Mutex<Option<mpsc::Receiver<AnyBuffer>>>,
}

impl H265Payloader {
    pub fn new(id: impl Into<String>, ssrc: u32, max_payload: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(64);
        Arc::new(Self {
            id: id.into(),
            packetizer: H265Packetizer::new(ssrc, max_payload),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn stats(&self) -> PacketizerStats {
        self.packetizer.stats()
    }
}

impl Element for H265Payloader {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Filter
    }
}

#[async_trait]
impl Source for H265Payloader {
    fn output_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::OutputDefault).then(BufferType::of::<RtpPacket>)
    }

    fn open(&self, pad: &PadRef) -> Result<BufferStream, PipelineError> {
        if *pad != PadRef::OutputDefault {
            return Err(PipelineError::PadNotFound {
                element: self.id.clone(),
                direction: "output",
                pad: pad.clone(),
            });
        }
        super::take_receiver(&self.id, pad, &self.rx)
    }
}

#[async_trait]
impl Sink for H265Payloader {
    fn input_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::InputDefault).then(BufferType::of::<EncodedH265Frame>)
    }

    async fn handle(
        &self,
        _ctx: PipelineHandle,
        _pad: &PadRef,
        input: AnyBuffer,
    ) -> Result<(), ElementError> {
        let frame = downcast::<EncodedH265Frame>(&input)
            .ok_or_else(|| ElementError::new("unexpected buffer type"))?;

        let packets = match self.packetizer.packetize(frame) {
            Ok(packets) => packets,
            Err(e) => {
                warn!(element = %self.id, error = %e, "dropping unpacketizable frame");
                return Ok(());
            }
        };

        for packet in packets {
            self.tx
                .send(buffer(packet))
                .await
                .map_err(|_| ElementError::new("output pad closed"))?;
        }
        Ok(())
    }
}

impl Filter for H265Payloader {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h265::MediaTime;
    use crate::pipeline::Pipeline;
    use bytes::{BufMut, Bytes, BytesMut};
    use futures_util::StreamExt;

    fn frame() -> EncodedH265Frame {
        let mut payload = BytesMut::new();
        payload.put_u32(3);
        payload.put_slice(&[0x40, 0x01, 0xAA]);
        EncodedH265Frame {
            payload: payload.freeze(),
            pts: MediaTime::new(0, 90_000),
            duration: MediaTime::new(3000, 90_000),
            is_keyframe: false,
            format: None,
        }
    }

    #[tokio::test]
    async fn test_payloader_emits_packets() {
        let payloader = H265Payloader::new("pay", 7, 1400);
        let mut output = payloader.open(&PadRef::OutputDefault).unwrap();
        let pipeline = Pipeline::new();

        payloader
            .handle(pipeline.handle(), &PadRef::InputDefault, buffer(frame()))
            .await
            .unwrap();

        let produced = output.next().await.unwrap();
        let packet = downcast::<RtpPacket>(&produced).unwrap();
        assert_eq!(packet.header.ssrc, 7);
        assert_eq!(&packet.payload[..], &[0x40, 0x01, 0xAA]);
        assert_eq!(payloader.stats().packet_count, 1);
    }

    #[tokio::test]
    async fn test_payloader_drops_bad_frame() {
        let payloader = H265Payloader::new("pay", 7, 1400);
        let _output = payloader.open(&PadRef::OutputDefault).unwrap();
        let pipeline = Pipeline::new();

        let empty = EncodedH265Frame {
            payload: Bytes::new(),
            pts: MediaTime::new(0, 90_000),
            duration: MediaTime::new(3000, 90_000),
            is_keyframe: false,
            format: None,
        };

        // Unpacketizable input is dropped, not fatal to the edge.
        payloader
            .handle(pipeline.handle(), &PadRef::InputDefault, buffer(empty))
            .await
            .unwrap();
        assert_eq!(payloader.stats().packet_count, 0);
    }
}
