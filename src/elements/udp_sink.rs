//! Pipeline element wrapping the UDP network sink.

use std::sync::Arc;

use async_trait::async_trait;

use crate::net::{RtpSink, RtpSinkConfig, SinkError, SinkStats, SocketState};
use crate::pipeline::{
    downcast, AnyBuffer, BufferType, Element, ElementError, ElementKind, PadRef, PipelineHandle,
    Sink,
};
use crate::rtp::RtpPacket;

/// Sink element forwarding [`RtpPacket`] buffers to a [`RtpSink`].
///
/// Transport failures are absorbed by the inner sink's counters; the edge
/// never closes because of them.
pub struct RtpUdpSink {
    id: String,
    sink: Arc<RtpSink>,
}

impl RtpUdpSink {
    /// Opens the sockets and wraps them as a pipeline sink.
    pub async fn connect(
        id: impl Into<String>,
        config: RtpSinkConfig,
    ) -> Result<Arc<Self>, SinkError> {
        let sink = RtpSink::connect(config).await?;
        Ok(Arc::new(Self { id: id.into(), sink }))
    }

    pub fn stats(&self) -> SinkStats {
        self.sink.stats()
    }

    pub fn state(&self) -> SocketState {
        self.sink.state()
    }

    pub async fn stop(&self) {
        self.sink.stop().await;
    }
}

impl Element for RtpUdpSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Sink
    }
}

#[async_trait]
impl Sink for RtpUdpSink {
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
        self.sink.send(packet).await;
        Ok(())
    }
}
