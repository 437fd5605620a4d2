//! Graph-structured media pipeline runtime with an H.265/RTP streaming
//! stack built on top of it.
//!
//! Elements (sources, filters, sinks) expose typed pads and are wired into
//! groups by a schema; the [`pipeline::Pipeline`] runtime spawns one worker
//! task per resolved edge and drives buffers from output pads into sink
//! handlers. On the media side, [`rtp::H265Packetizer`] and
//! [`rtp::H265Depacketizer`] implement RFC 7798 payloading over AVCC
//! frames, and [`net::RtpSink`] puts the packets on the wire with periodic
//! RTCP sender reports.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bytes::Bytes;
//! use rust_h265_rtp::elements::{CollectSink, TestDataSource};
//! use rust_h265_rtp::pipeline::{Pipeline, SchemaChild};
//!
//! # async fn demo() -> Result<(), rust_h265_rtp::pipeline::PipelineError> {
//! let source = TestDataSource::new("src", Duration::from_millis(10), 10);
//! let sink = CollectSink::<Bytes>::new("sink");
//!
//! let pipeline = Pipeline::new();
//! pipeline
//!     .build_linear(vec![
//!         SchemaChild::source(source),
//!         SchemaChild::sink(sink.clone()),
//!     ])
//!     .await?;
//! pipeline.wait_for_completion().await;
//! assert_eq!(sink.len(), 10);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod elements;
pub mod h265;
pub mod net;
pub mod pipeline;
pub mod rtp;

// Re-exports for convenience
pub use config::Config;
pub use h265::{EncodedH265Frame, MediaTime, ParameterSets};
pub use net::{RtpSink, RtpSinkConfig, SenderReport, SinkStats};
pub use pipeline::{Pipeline, PipelineHandle, PipelineStatus, SchemaChild, SchemaItem};
pub use rtp::{H265Depacketizer, H265Packetizer, RtpHeader, RtpPacket};
