//! Graph pipeline runtime: schema-driven wiring of elements with one worker
//! task per edge.
//!
//! Elements are shared with the caller through `Arc`s; the pipeline borrows
//! them via schema items and owns only the worker tasks it spawns. A worker
//! pulls buffers from its source pad and hands each one to the sink handler,
//! so upstream throughput is naturally gated by downstream latency.

mod element;
mod error;
mod pad;
mod schema;

pub use element::{Element, ElementError, ElementKind, Filter, Sink, Source};
pub use error::PipelineError;
pub use pad::{buffer, downcast, downcast_arc, AnyBuffer, BufferStream, BufferType, PadRef};
pub use schema::{EdgeId, SchemaChild, SchemaItem};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use schema::PendingEdge;

/// Buffers a lagging fan-out consumer may fall behind before it skips.
pub const FANOUT_CAPACITY: usize = 16;

const COMPLETION_POLL: Duration = Duration::from_millis(10);

/// Aggregate view reported by [`Pipeline::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    /// Distinct owning element ids currently in the schema.
    pub child_count: usize,
    /// Live edges, each driven by one worker task.
    pub active_connections: usize,
    /// Group ids in schema order.
    pub groups: Vec<String>,
}

/// The pipeline runtime.
///
/// Cheap to clone; all clones share the same schema and edge list.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

/// Handle given to sink handlers; upgrades to the pipeline on demand so
/// handlers cannot keep it alive past its owner.
#[derive(Clone)]
pub struct PipelineHandle {
    inner: Weak<Inner>,
}

impl PipelineHandle {
    pub fn upgrade(&self) -> Option<Pipeline> {
        self.inner.upgrade().map(|inner| Pipeline { inner })
    }
}

struct Inner {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    items: Vec<SchemaItem>,
    edges: Vec<ActiveEdge>,
    /// Multicast senders per shared output pad.
    fanout: HashMap<(String, PadRef), FanoutPump>,
    /// Output pads handed directly to a single worker.
    opened: HashSet<(String, PadRef)>,
}

struct ActiveEdge {
    id: EdgeId,
    source: Arc<dyn Source>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

struct FanoutPump {
    tx: broadcast::Sender<AnyBuffer>,
    pump: JoinHandle<()>,
}

enum EdgeInput {
    Direct(BufferStream),
    Fanout(broadcast::Receiver<AnyBuffer>),
}

impl EdgeInput {
    async fn next(&mut self, edge: &EdgeId) -> Option<AnyBuffer> {
        match self {
            EdgeInput::Direct(stream) => stream.next().await,
            EdgeInput::Fanout(rx) => loop {
                match rx.recv().await {
                    Ok(buffer) => return Some(buffer),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(edge = %edge, missed, "edge lagging behind fan-out, skipping");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Appends schema items and spawns a worker for every new edge.
    ///
    /// Edges already live in the same group with identical source/sink ids
    /// are left untouched, so re-submitting a schema is idempotent.
    pub async fn spec(&self, items: Vec<SchemaItem>) -> Result<(), PipelineError> {
        let mut state = self.inner.state.lock().await;
        Self::prune_finished(&mut state);

        let mut combined = state.items.clone();
        combined.extend(items);
        let pending = schema::resolve(&combined)?;
        state.items = combined;

        let new: Vec<PendingEdge> = pending
            .into_iter()
            .filter(|edge| !state.edges.iter().any(|active| active.id == edge.id))
            .collect();

        self.spawn_edges(&mut state, new);
        Ok(())
    }

    /// Connects `children` linearly inside a single group named `main`,
    /// replacing the current schema.
    pub async fn build_linear(&self, children: Vec<SchemaChild>) -> Result<(), PipelineError> {
        self.build_groups(vec![("main".to_string(), children)]).await
    }

    /// Replaces the current schema with the given groups.
    pub async fn build_groups(
        &self,
        groups: Vec<(String, Vec<SchemaChild>)>,
    ) -> Result<(), PipelineError> {
        self.teardown(true).await;
        self.spec(
            groups
                .into_iter()
                .map(|(id, children)| SchemaItem::new(id, children))
                .collect(),
        )
        .await
    }

    /// Workers start at `spec` time; this only exists so embedders can be
    /// explicit about the lifecycle.
    pub async fn start(&self) {
        debug!("pipeline started");
    }

    /// Cancels every worker, notifies their sources and drains the edge
    /// list. Infallible.
    pub async fn stop(&self) {
        self.teardown(false).await;
    }

    async fn teardown(&self, clear_items: bool) {
        let (edges, pumps) = {
            let mut state = self.inner.state.lock().await;
            if clear_items {
                state.items.clear();
            }
            state.opened.clear();
            let pumps: Vec<FanoutPump> = state.fanout.drain().map(|(_, pump)| pump).collect();
            (std::mem::take(&mut state.edges), pumps)
        };

        for pump in &pumps {
            pump.pump.abort();
        }

        for edge in edges {
            let _ = edge.shutdown.send(true);
            edge.source.on_cancel(&edge.id).await;
            let _ = edge.worker.await;
        }
    }

    /// Cancels and drops every edge touching `id`, dropping schema items
    /// that only contained that child. Infallible.
    pub async fn remove_child(&self, id: &str) {
        let removed = {
            let mut state = self.inner.state.lock().await;

            state
                .items
                .retain(|item| !(item.children.len() == 1 && item.children[0].id() == id));

            let mut removed = Vec::new();
            let mut kept = Vec::new();
            for edge in state.edges.drain(..) {
                if edge.id.source == id || edge.id.sink == id {
                    removed.push(edge);
                } else {
                    kept.push(edge);
                }
            }
            state.edges = kept;

            let stale: Vec<(String, PadRef)> = state
                .fanout
                .keys()
                .filter(|(element, _)| element == id)
                .cloned()
                .collect();
            for key in stale {
                if let Some(pump) = state.fanout.remove(&key) {
                    pump.pump.abort();
                }
            }
            state.opened.retain(|(element, _)| element != id);

            removed
        };

        for edge in removed {
            let _ = edge.shutdown.send(true);
            edge.source.on_cancel(&edge.id).await;
            let _ = edge.worker.await;
        }
    }

    pub async fn status(&self) -> PipelineStatus {
        let mut state = self.inner.state.lock().await;
        Self::prune_finished(&mut state);

        let mut owners = HashSet::new();
        let mut groups = Vec::new();
        for item in &state.items {
            if !groups.contains(&item.id) {
                groups.push(item.id.clone());
            }
            for child in &item.children {
                if !child.is_ref() {
                    owners.insert(child.id().to_string());
                }
            }
        }

        PipelineStatus {
            child_count: owners.len(),
            active_connections: state.edges.len(),
            groups,
        }
    }

    /// Completes once every worker task has finished (sources exhausted
    /// their sequences).
    pub async fn wait_for_completion(&self) {
        loop {
            {
                let mut state = self.inner.state.lock().await;
                Self::prune_finished(&mut state);
                if state.edges.is_empty() {
                    return;
                }
            }
            tokio::time::sleep(COMPLETION_POLL).await;
        }
    }

    fn prune_finished(state: &mut State) {
        // Dropping a finished pump drops its sender, which in turn lets the
        // fan-out workers observe end of stream.
        state.fanout.retain(|_, fanout| !fanout.pump.is_finished());
        state.edges.retain(|edge| !edge.worker.is_finished());
    }

    fn spawn_edges(&self, state: &mut State, pending: Vec<PendingEdge>) {
        let mut consumers: HashMap<(String, PadRef), usize> = HashMap::new();
        for edge in &pending {
            let key = (edge.source.element.id().to_string(), edge.source.pad.clone());
            *consumers.entry(key).or_default() += 1;
        }

        for edge in pending {
            // Connection-time type check: a mismatch rejects this edge only.
            let source_type = edge.source.element.output_type(&edge.source.pad);
            let sink_type = edge.sink.element.input_type(&edge.sink.pad);
            match (source_type, sink_type) {
                (Some(s), Some(t)) if s == t => {}
                (Some(s), Some(t)) => {
                    let rejected = PipelineError::TypeMismatch {
                        edge: edge.id.clone(),
                        source_type: s.name(),
                        sink_type: t.name(),
                    };
                    error!(error = %rejected, "rejecting edge");
                    continue;
                }
                _ => {
                    error!(edge = %edge.id, "pad disappeared during connection, rejecting edge");
                    continue;
                }
            }

            let key = (edge.source.element.id().to_string(), edge.source.pad.clone());
            let shared = consumers.get(&key).copied().unwrap_or(0) > 1
                || state.fanout.contains_key(&key);

            let input = if shared {
                let rx = match state.fanout.get(&key) {
                    Some(fanout) => fanout.tx.subscribe(),
                    None => {
                        let stream = match edge.source.element.open(&edge.source.pad) {
                            Ok(stream) => stream,
                            Err(e) => {
                                error!(edge = %edge.id, error = %e, "failed to open source pad");
                                continue;
                            }
                        };
                        let (tx, rx) = broadcast::channel(FANOUT_CAPACITY);
                        let pump = tokio::spawn(fanout_pump(stream, tx.clone()));
                        state.fanout.insert(key.clone(), FanoutPump { tx, pump });
                        rx
                    }
                };
                EdgeInput::Fanout(rx)
            } else {
                if state.opened.contains(&key) {
                    warn!(
                        edge = %edge.id,
                        "output pad sequence already consumed, rejecting edge"
                    );
                    continue;
                }
                match edge.source.element.open(&edge.source.pad) {
                    Ok(stream) => {
                        state.opened.insert(key);
                        EdgeInput::Direct(stream)
                    }
                    Err(e) => {
                        error!(edge = %edge.id, error = %e, "failed to open source pad");
                        continue;
                    }
                }
            };

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let worker = tokio::spawn(edge_worker(
                edge.id.clone(),
                input,
                edge.sink.element.clone(),
                edge.sink.pad.clone(),
                self.handle(),
                shutdown_rx,
            ));

            state.edges.push(ActiveEdge {
                id: edge.id,
                source: edge.source.element,
                shutdown: shutdown_tx,
                worker,
            });
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one edge: pull a buffer, hand it to the sink, repeat.
async fn edge_worker(
    id: EdgeId,
    mut input: EdgeInput,
    sink: Arc<dyn Sink>,
    pad: PadRef,
    handle: PipelineHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(edge = %id, "edge worker started");

    loop {
        // Cancellation is only observed between buffers; a handler that is
        // already running finishes its delivery.
        let buffer = tokio::select! {
            _ = shutdown.changed() => break,
            next = input.next(&id) => match next {
                Some(buffer) => buffer,
                None => break,
            },
        };

        if let Err(e) = sink.handle(handle.clone(), &pad, buffer).await {
            error!(edge = %id, error = %e, "sink handler failed, closing edge");
            break;
        }
    }

    debug!(edge = %id, "edge worker finished");
}

/// Reads a shared output pad once and re-publishes every buffer to all
/// subscribed edges.
async fn fanout_pump(mut stream: BufferStream, tx: broadcast::Sender<AnyBuffer>) {
    while let Some(buffer) = stream.next().await {
        if tx.send(buffer).is_err() {
            // No subscriber right now; the buffer is dropped, peers that
            // subscribe later pick up from here.
            debug!("fan-out buffer dropped, no subscribers");
        }
    }
}
