//! Pipeline element wrapping the RTP depacketizer.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::h265::EncodedH265Frame;
use crate::pipeline::{
    buffer, downcast, AnyBuffer, BufferStream, BufferType, Element, ElementError, ElementKind,
    Filter, PadRef, PipelineError, PipelineHandle, Sink, Source,
};
use crate::rtp::{H265Depacketizer, RtpPacket};

/// Filter reassembling [`RtpPacket`] buffers into [`EncodedH265Frame`]s.
pub struct H265Depayloader {
    id: String,
    depacketizer: Mutex<H265Depacketizer>,
    tx: mpsc::Sender<AnyBuffer>,
    rx: Mutex<Option<mpsc::Receiver<AnyBuffer>>>,
}

impl H265Depayloader {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(64);
        Arc::new(Self {
            id: id.into(),
            depacketizer: Mutex::new(H265Depacketizer::new()),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    /// Flushes every timestamp still pending, in ascending order.
    pub async fn finish(&self) -> Result<(), ElementError> {
        let frames = self.depacketizer.lock().finish();
        for frame in frames {
            self.tx
                .send(buffer(frame))
                .await
                .map_err(|_| ElementError::new("output pad closed"))?;
        }
        Ok(())
    }
}

impl Element for H265Depayloader {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Filter
    }
}

#[async_trait]
impl Source for H265Depayloader {
    fn output_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::OutputDefault).then(BufferType::of::<EncodedH265Frame>)
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
impl Sink for H265Depayloader {
    fn input_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::InputDefault).then(BufferType::of::<RtpPacket>)
    }

    async fn handle(
        &self,
        _ctx: PipelineHandle,
        _pad: &PadRef,
        input: AnyBuffer,
    ) -> Result<(), ElementError> {
        let packet = downcast::<RtpPacket>(&input)
            .ok_or_else(|| ElementError::new("unexpected buffer type"))?;

        let frames = self.depacketizer.lock().push(packet);
        for frame in frames {
            self.tx
                .send(buffer(frame))
                .await
                .map_err(|_| ElementError::new("output pad closed"))?;
        }
        Ok(())
    }
}

impl Filter for H265Depayloader {}
