//! Element traits: the capability surface the runtime schedules against.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use super::error::PipelineError;
use super::pad::{AnyBuffer, BufferStream, BufferType, PadRef};
use super::schema::EdgeId;
use super::PipelineHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Source,
    Filter,
    Sink,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Source => f.write_str("source"),
            ElementKind::Filter => f.write_str("filter"),
            ElementKind::Sink => f.write_str("sink"),
        }
    }
}

/// Error surfaced by a sink handler. It terminates the edge that delivered
/// the buffer; sibling edges keep running.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ElementError(String);

impl ElementError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Common identity shared by every element.
pub trait Element: Send + Sync {
    /// Stable identifier, unique across the pipeline.
    fn id(&self) -> &str;

    fn kind(&self) -> ElementKind;
}

/// An element that produces buffers on one or more output pads.
#[async_trait]
pub trait Source: Element {
    fn output_pads(&self) -> Vec<PadRef> {
        vec![PadRef::OutputDefault]
    }

    /// Buffer type emitted by `pad`, `None` if the pad does not exist.
    fn output_type(&self, pad: &PadRef) -> Option<BufferType>;

    /// Opens the pad's buffer sequence.
    fn open(&self, pad: &PadRef) -> Result<BufferStream, PipelineError>;

    /// Called when an edge fed by this element is cancelled, so producer
    /// resources can be released.
    async fn on_cancel(&self, _edge: &EdgeId) {}
}

/// An element that accepts buffers on one or more input pads.
#[async_trait]
pub trait Sink: Element {
    fn input_pads(&self) -> Vec<PadRef> {
        vec![PadRef::InputDefault]
    }

    /// Buffer type accepted by `pad`, `None` if the pad does not exist.
    fn input_type(&self, pad: &PadRef) -> Option<BufferType>;

    /// Accepts one buffer. The upstream sequence does not advance until this
    /// returns; an error closes the delivering edge only.
    async fn handle(
        &self,
        ctx: PipelineHandle,
        pad: &PadRef,
        buffer: AnyBuffer,
    ) -> Result<(), ElementError>;
}

/// An element that both consumes and produces.
pub trait Filter: Source + Sink {}
