//! Schema items and their resolution into connectable edges.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::element::{ElementKind, Filter, Sink, Source};
use super::error::PipelineError;
use super::pad::PadRef;

/// Identity of one edge: the group it lives in plus its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeId {
    pub group: String,
    pub source: String,
    pub sink: String,
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}->{}", self.group, self.source, self.sink)
    }
}

/// A named group whose children are connected linearly in order.
#[derive(Clone)]
pub struct SchemaItem {
    pub id: String,
    pub children: Vec<SchemaChild>,
}

impl SchemaItem {
    pub fn new(id: impl Into<String>, children: Vec<SchemaChild>) -> Self {
        Self {
            id: id.into(),
            children,
        }
    }
}

/// One child of a group: an owned element with its chosen pads, or a
/// reference to an element owned elsewhere.
#[derive(Clone)]
pub enum SchemaChild {
    Source {
        element: Arc<dyn Source>,
        output: PadRef,
    },
    Filter {
        element: Arc<dyn Filter>,
        input: PadRef,
        output: PadRef,
    },
    Sink {
        element: Arc<dyn Sink>,
        input: PadRef,
    },
    SourceRef {
        id: String,
        output: PadRef,
    },
    FilterRef {
        id: String,
        input: PadRef,
        output: PadRef,
    },
    SinkRef {
        id: String,
        input: PadRef,
    },
}

impl SchemaChild {
    pub fn source(element: Arc<dyn Source>) -> Self {
        Self::Source {
            element,
            output: PadRef::OutputDefault,
        }
    }

    pub fn source_on(element: Arc<dyn Source>, output: PadRef) -> Self {
        Self::Source { element, output }
    }

    pub fn filter(element: Arc<dyn Filter>) -> Self {
        Self::Filter {
            element,
            input: PadRef::InputDefault,
            output: PadRef::OutputDefault,
        }
    }

    pub fn sink(element: Arc<dyn Sink>) -> Self {
        Self::Sink {
            element,
            input: PadRef::InputDefault,
        }
    }

    pub fn sink_on(element: Arc<dyn Sink>, input: PadRef) -> Self {
        Self::Sink { element, input }
    }

    pub fn source_ref(id: impl Into<String>) -> Self {
        Self::SourceRef {
            id: id.into(),
            output: PadRef::OutputDefault,
        }
    }

    pub fn source_ref_on(id: impl Into<String>, output: PadRef) -> Self {
        Self::SourceRef {
            id: id.into(),
            output,
        }
    }

    pub fn sink_ref(id: impl Into<String>) -> Self {
        Self::SinkRef {
            id: id.into(),
            input: PadRef::InputDefault,
        }
    }

    pub fn filter_ref(id: impl Into<String>) -> Self {
        Self::FilterRef {
            id: id.into(),
            input: PadRef::InputDefault,
            output: PadRef::OutputDefault,
        }
    }

    /// Element id this child names, owned or referenced.
    pub fn id(&self) -> &str {
        match self {
            Self::Source { element, .. } => element.id(),
            Self::Filter { element, .. } => element.id(),
            Self::Sink { element, .. } => element.id(),
            Self::SourceRef { id, .. } | Self::FilterRef { id, .. } | Self::SinkRef { id, .. } => {
                id
            }
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Source { .. } | Self::SourceRef { .. } => ElementKind::Source,
            Self::Filter { .. } | Self::FilterRef { .. } => ElementKind::Filter,
            Self::Sink { .. } | Self::SinkRef { .. } => ElementKind::Sink,
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(
            self,
            Self::SourceRef { .. } | Self::FilterRef { .. } | Self::SinkRef { .. }
        )
    }
}

pub(crate) struct ResolvedSource {
    pub element: Arc<dyn Source>,
    pub pad: PadRef,
}

pub(crate) struct ResolvedSink {
    pub element: Arc<dyn Sink>,
    pub pad: PadRef,
}

pub(crate) struct PendingEdge {
    pub id: EdgeId,
    pub source: ResolvedSource,
    pub sink: ResolvedSink,
}

/// Resolves a schema into its pending edges.
///
/// Owning children are collected into an id map (duplicates are fatal),
/// references are dereferenced through it, and each adjacent pair inside a
/// group becomes one edge. Pad existence is verified here; buffer-type
/// compatibility is left to connection time so a mismatch only rejects the
/// one edge.
pub(crate) fn resolve(items: &[SchemaItem]) -> Result<Vec<PendingEdge>, PipelineError> {
    let mut owners: HashMap<&str, &SchemaChild> = HashMap::new();
    for item in items {
        for child in &item.children {
            if child.is_ref() {
                continue;
            }
            if owners.insert(child.id(), child).is_some() {
                return Err(PipelineError::DuplicateId(child.id().to_string()));
            }
        }
    }

    let mut edges = Vec::new();
    for item in items {
        for pair in item.children.windows(2) {
            let source = resolve_source_side(&pair[0], &owners)?;
            let sink = resolve_sink_side(&pair[1], &owners)?;

            if source.element.output_type(&source.pad).is_none() {
                return Err(PipelineError::PadNotFound {
                    element: source.element.id().to_string(),
                    direction: "output",
                    pad: source.pad,
                });
            }
            if sink.element.input_type(&sink.pad).is_none() {
                return Err(PipelineError::PadNotFound {
                    element: sink.element.id().to_string(),
                    direction: "input",
                    pad: sink.pad,
                });
            }

            edges.push(PendingEdge {
                id: EdgeId {
                    group: item.id.clone(),
                    source: source.element.id().to_string(),
                    sink: sink.element.id().to_string(),
                },
                source,
                sink,
            });
        }
    }

    Ok(edges)
}

fn deref<'a>(
    id: &str,
    expected: ElementKind,
    owners: &HashMap<&str, &'a SchemaChild>,
) -> Result<&'a SchemaChild, PipelineError> {
    let child = owners
        .get(id)
        .copied()
        .ok_or_else(|| PipelineError::UnknownRef(id.to_string()))?;
    if child.kind() != expected {
        return Err(PipelineError::KindMismatch {
            id: id.to_string(),
            expected,
            found: child.kind(),
        });
    }
    Ok(child)
}

fn resolve_source_side(
    child: &SchemaChild,
    owners: &HashMap<&str, &SchemaChild>,
) -> Result<ResolvedSource, PipelineError> {
    match child {
        SchemaChild::Source { element, output } => Ok(ResolvedSource {
            element: element.clone(),
            pad: output.clone(),
        }),
        SchemaChild::Filter { element, output, .. } => Ok(ResolvedSource {
            element: element.clone(),
            pad: output.clone(),
        }),
        SchemaChild::SourceRef { id, output } => {
            match deref(id, ElementKind::Source, owners)? {
                SchemaChild::Source { element, .. } => Ok(ResolvedSource {
                    element: element.clone(),
                    pad: output.clone(),
                }),
                _ => unreachable!("deref checked the kind"),
            }
        }
        SchemaChild::FilterRef { id, output, .. } => {
            match deref(id, ElementKind::Filter, owners)? {
                SchemaChild::Filter { element, .. } => Ok(ResolvedSource {
                    element: element.clone(),
                    pad: output.clone(),
                }),
                _ => unreachable!("deref checked the kind"),
            }
        }
        SchemaChild::Sink { element, .. } => Err(PipelineError::KindMismatch {
            id: element.id().to_string(),
            expected: ElementKind::Source,
            found: ElementKind::Sink,
        }),
        SchemaChild::SinkRef { id, .. } => Err(PipelineError::KindMismatch {
            id: id.clone(),
            expected: ElementKind::Source,
            found: ElementKind::Sink,
        }),
    }
}

fn resolve_sink_side(
    child: &SchemaChild,
    owners: &HashMap<&str, &SchemaChild>,
) -> Result<ResolvedSink, PipelineError> {
    match child {
        SchemaChild::Sink { element, input } => Ok(ResolvedSink {
            element: element.clone(),
            pad: input.clone(),
        }),
        SchemaChild::Filter { element, input, .. } => Ok(ResolvedSink {
            element: element.clone(),
            pad: input.clone(),
        }),
        SchemaChild::SinkRef { id, input } => match deref(id, ElementKind::Sink, owners)? {
            SchemaChild::Sink { element, .. } => Ok(ResolvedSink {
                element: element.clone(),
                pad: input.clone(),
            }),
            _ => unreachable!("deref checked the kind"),
        },
        SchemaChild::FilterRef { id, input, .. } => {
            match deref(id, ElementKind::Filter, owners)? {
                SchemaChild::Filter { element, .. } => Ok(ResolvedSink {
                    element: element.clone(),
                    pad: input.clone(),
                }),
                _ => unreachable!("deref checked the kind"),
            }
        }
        SchemaChild::Source { element, .. } => Err(PipelineError::KindMismatch {
            id: element.id().to_string(),
            expected: ElementKind::Sink,
            found: ElementKind::Source,
        }),
        SchemaChild::SourceRef { id, .. } => Err(PipelineError::KindMismatch {
            id: id.clone(),
            expected: ElementKind::Sink,
            found: ElementKind::Source,
        }),
    }
}
