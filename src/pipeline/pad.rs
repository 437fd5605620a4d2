//! Typed pads and the type-erased buffer representation.

use std::any::{Any, TypeId};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;

/// A buffer travelling along an edge.
///
/// Buffers are reference-counted and immutable, so handing one to several
/// workers is a refcount bump rather than a copy.
pub type AnyBuffer = Arc<dyn Any + Send + Sync>;

/// Boxed asynchronous sequence produced by an output pad. Finite or
/// infinite, single-consumer, not necessarily restartable.
pub type BufferStream = Pin<Box<dyn Stream<Item = AnyBuffer> + Send>>;

/// Identifies one pad on an element, unique per direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PadRef {
    InputDefault,
    OutputDefault,
    Custom(String),
}

impl PadRef {
    pub fn custom(id: impl Into<String>) -> Self {
        PadRef::Custom(id.into())
    }
}

impl fmt::Display for PadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadRef::InputDefault => write!(f, "in"),
            PadRef::OutputDefault => write!(f, "out"),
            PadRef::Custom(id) => write!(f, "{id}"),
        }
    }
}

/// Runtime identity of the buffer type flowing through a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferType {
    id: TypeId,
    name: &'static str,
}

impl BufferType {
    pub fn of<B: Any>() -> Self {
        Self {
            id: TypeId::of::<B>(),
            name: std::any::type_name::<B>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Wraps a typed value for transport along an edge.
pub fn buffer<B: Any + Send + Sync>(value: B) -> AnyBuffer {
    Arc::new(value)
}

/// Views a transported buffer as `B`, if that is what it carries.
pub fn downcast<B: Any + Send + Sync>(buffer: &AnyBuffer) -> Option<&B> {
    buffer.downcast_ref::<B>()
}

/// Recovers shared ownership of the typed value inside a buffer.
pub fn downcast_arc<B: Any + Send + Sync>(buffer: AnyBuffer) -> Result<Arc<B>, AnyBuffer> {
    buffer.downcast::<B>()
}
