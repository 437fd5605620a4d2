use thiserror::Error;

use super::element::ElementKind;
use super::pad::PadRef;
use super::schema::EdgeId;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("duplicate element id `{0}` in schema")]
    DuplicateId(String),

    #[error("reference to unknown element `{0}`")]
    UnknownRef(String),

    #[error("reference `{id}` expects a {expected}, resolved to a {found}")]
    KindMismatch {
        id: String,
        expected: ElementKind,
        found: ElementKind,
    },

    #[error("element `{element}` has no {direction} pad `{pad}`")]
    PadNotFound {
        element: String,
        direction: &'static str,
        pad: PadRef,
    },

    #[error("type mismatch on {edge}: source emits {source_type}, sink accepts {sink_type}")]
    TypeMismatch {
        edge: EdgeId,
        source_type: &'static str,
        sink_type: &'static str,
    },

    #[error("output pad `{pad}` on `{element}` cannot be opened twice")]
    StreamUnavailable { element: String, pad: PadRef },
}
