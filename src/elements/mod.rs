//! Ready-made pipeline elements: reference implementations for tests and
//! the H.265/RTP building blocks.

mod depayloader;
mod payloader;
mod testing;
mod udp_sink;

pub use depayloader::H265Depayloader;
pub use payloader::H265Payloader;
pub use testing::{BufferingFilter, CollectSink, MultiOutSource, TestDataSource, TransformFilter};
pub use udp_sink::RtpUdpSink;

use futures_util::stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::pipeline::{AnyBuffer, BufferStream, PadRef, PipelineError};

/// Adapts an mpsc receiver into an output-pad buffer stream.
pub(crate) fn receiver_stream(rx: mpsc::Receiver<AnyBuffer>) -> BufferStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|buffer| (buffer, rx))
    }))
}

/// Claims a filter's output receiver; a second claim fails because the
/// sequence is single-consumer and not restartable.
pub(crate) fn take_receiver(
    element: &str,
    pad: &PadRef,
    slot: &Mutex<Option<mpsc::Receiver<AnyBuffer>>>,
) -> Result<BufferStream, PipelineError> {
    slot.lock()
        .take()
        .map(receiver_stream)
        .ok_or_else(|| PipelineError::StreamUnavailable {
            element: element.to_string(),
            pad: pad.clone(),
        })
}
