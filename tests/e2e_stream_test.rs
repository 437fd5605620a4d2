//! End-to-end streaming tests: encoded frames through the pipeline graph,
//! over RTP, and back.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use rust_h265_rtp::elements::{CollectSink, H265Depayloader, H265Payloader, RtpUdpSink};
use rust_h265_rtp::h265::{EncodedH265Frame, MediaTime, ParameterSets};
use rust_h265_rtp::net::RtpSinkConfig;
use rust_h265_rtp::pipeline::{
    buffer, BufferStream, BufferType, Element, ElementKind, PadRef, Pipeline, PipelineError,
    SchemaChild, Source,
};
use rust_h265_rtp::rtp::{H265Depacketizer, RtpPacket};

/// Wraps raw NAL units into a 4-byte length-prefixed AVCC payload.
fn avcc(nals: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::new();
    for nal in nals {
        buf.put_u32(nal.len() as u32);
        buf.put_slice(nal);
    }
    buf.freeze()
}

/// Produces a short, deterministic sequence of encoded frames: one keyframe
/// with parameter sets, then small delta frames.
struct FrameSource {
    id: String,
    frames: Vec<EncodedH265Frame>,
}

impl FrameSource {
    fn new(id: &str, frames: Vec<EncodedH265Frame>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            frames,
        })
    }
}

impl Element for FrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Source
    }
}

#[async_trait]
impl Source for FrameSource {
    fn output_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::OutputDefault).then(BufferType::of::<EncodedH265Frame>)
    }

    fn open(&self, _pad: &PadRef) -> Result<BufferStream, PipelineError> {
        let frames = self.frames.clone();
        Ok(Box::pin(futures_util::stream::iter(
            frames.into_iter().map(buffer),
        )))
    }
}

fn test_frames() -> Vec<EncodedH265Frame> {
    let sets = ParameterSets::new(
        Bytes::from_static(&[0x40, 0x01, 0x0C]),
        Bytes::from_static(&[0x42, 0x01, 0x01]),
        Bytes::from_static(&[0x44, 0x01, 0xC0]),
    );

    let mut idr = vec![0x26, 0x01];
    idr.extend((0..5000u32).map(|i| (i % 241) as u8));

    let mut frames = vec![EncodedH265Frame {
        payload: avcc(&[&idr]),
        pts: MediaTime::new(0, 90_000),
        duration: MediaTime::new(3000, 90_000),
        is_keyframe: true,
        format: Some(sets),
    }];

    for n in 1..4i64 {
        frames.push(EncodedH265Frame {
            payload: avcc(&[&[0x02, 0x01, n as u8, 0xEE]]),
            pts: MediaTime::new(n * 3000, 90_000),
            duration: MediaTime::new(3000, 90_000),
            is_keyframe: false,
            format: None,
        });
    }

    frames
}

#[tokio::test]
async fn test_frames_survive_packetize_depacketize_graph() -> Result<()> {
    let frames = test_frames();
    let source = FrameSource::new("enc", frames.clone());
    let payloader = H265Payloader::new("pay", 0x5EED, 1400);
    let depayloader = H265Depayloader::new("depay");
    let collector = CollectSink::<EncodedH265Frame>::new("out");

    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![
            SchemaChild::source(source),
            SchemaChild::filter(payloader.clone()),
            SchemaChild::filter(depayloader.clone()),
            SchemaChild::sink(collector.clone()),
        ])
        .await?;

    // Filters keep their output pads open, so poll the collector instead of
    // waiting for completion.
    for _ in 0..200 {
        if collector.len() >= frames.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pipeline.stop().await;

    let received = collector.collected();
    assert_eq!(received.len(), frames.len());

    for (sent, got) in frames.iter().zip(&received) {
        assert_eq!(got.payload, sent.payload, "payload changed in transit");
        assert_eq!(got.is_keyframe, sent.is_keyframe);
        assert_eq!(got.pts.value, sent.pts.value);
    }

    // The keyframe's parameter sets were latched and applied to every frame.
    assert!(received.iter().all(|f| f.format.is_some()));
    assert!(payloader.stats().packet_count > frames.len() as u32);

    Ok(())
}

#[tokio::test]
async fn test_frames_over_udp_loopback() -> Result<()> {
    let receiver = UdpSocket::bind("127.0.0.1:0").await?;
    let port = receiver.local_addr()?.port();

    let frames = test_frames();
    let source = FrameSource::new("enc", frames.clone());
    let payloader = H265Payloader::new("pay", 0xFEED_FACE, 1400);
    let udp_sink = RtpUdpSink::connect("net", RtpSinkConfig::new("127.0.0.1", port, 0xFEED_FACE))
        .await?;

    let pipeline = Pipeline::new();
    pipeline
        .build_linear(vec![
            SchemaChild::source(source),
            SchemaChild::filter(payloader.clone()),
            SchemaChild::sink(udp_sink.clone()),
        ])
        .await?;

    // Reassemble off the wire with a plain depacketizer.
    let mut depacketizer = H265Depacketizer::new();
    let mut received = Vec::new();
    let mut buf = [0u8; 2000];

    while received.len() < frames.len() {
        let (len, _) = timeout(Duration::from_secs(5), receiver.recv_from(&mut buf)).await??;
        let packet = RtpPacket::from_bytes(Bytes::copy_from_slice(&buf[..len]))
            .expect("malformed RTP datagram");
        received.extend(depacketizer.push(&packet));
    }

    pipeline.stop().await;
    udp_sink.stop().await;

    assert_eq!(received.len(), frames.len());
    for (sent, got) in frames.iter().zip(&received) {
        assert_eq!(got.payload, sent.payload);
        assert_eq!(got.is_keyframe, sent.is_keyframe);
    }

    let stats = udp_sink.stats();
    assert_eq!(stats.packets_sent, payloader.stats().packet_count);
    assert_eq!(stats.octets_sent, payloader.stats().octet_count);
    assert_eq!(stats.send_errors, 0);

    Ok(())
}
