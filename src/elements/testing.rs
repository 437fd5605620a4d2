//! Reference elements for exercising the pipeline runtime.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::pipeline::{
    buffer, downcast, AnyBuffer, BufferStream, BufferType, Element, ElementError, ElementKind,
    Filter, PadRef, PipelineError, PipelineHandle, Sink, Source,
};

use super::take_receiver;

/// Emits `count` numbered [`Bytes`] payloads at a fixed interval.
pub struct TestDataSource {
    id: String,
    interval: Duration,
    count: usize,
}

impl TestDataSource {
    pub fn new(id: impl Into<String>, interval: Duration, count: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            interval,
            count,
        })
    }
}

impl Element for TestDataSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Source
    }
}

#[async_trait]
impl Source for TestDataSource {
    fn output_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::OutputDefault).then(BufferType::of::<Bytes>)
    }

    fn open(&self, pad: &PadRef) -> Result<BufferStream, PipelineError> {
        if *pad != PadRef::OutputDefault {
            return Err(PipelineError::PadNotFound {
                element: self.id.clone(),
                direction: "output",
                pad: pad.clone(),
            });
        }

        let interval = self.interval;
        let count = self.count;
        let id = self.id.clone();

        Ok(Box::pin(stream::unfold(0usize, move |n| {
            let id = id.clone();
            async move {
                if n >= count {
                    return None;
                }
                tokio::time::sleep(interval).await;
                let payload = Bytes::from(format!("{id}-{n}"));
                Some((buffer(payload), n + 1))
            }
        })))
    }
}

/// Collects every received buffer of type `B` for later inspection.
pub struct CollectSink<B> {
    id: String,
    collected: Mutex<Vec<Arc<B>>>,
    _marker: PhantomData<fn() -> B>,
}

impl<B: Any + Send + Sync> CollectSink<B> {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            collected: Mutex::new(Vec::new()),
            _marker: PhantomData,
        })
    }

    pub fn collected(&self) -> Vec<Arc<B>> {
        self.collected.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.collected.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.lock().is_empty()
    }
}

impl<B: Any + Send + Sync> Element for CollectSink<B> {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Sink
    }
}

#[async_trait]
impl<B: Any + Send + Sync> Sink for CollectSink<B> {
    fn input_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::InputDefault).then(BufferType::of::<B>)
    }

    async fn handle(
        &self,
        _ctx: PipelineHandle,
        _pad: &PadRef,
        buffer: AnyBuffer,
    ) -> Result<(), ElementError> {
        let value = buffer
            .downcast::<B>()
            .map_err(|_| ElementError::new("unexpected buffer type"))?;
        self.collected.lock().push(value);
        Ok(())
    }
}

/// Maps each [`Bytes`] input through a closure and re-emits the result.
pub struct TransformFilter {
    id: String,
    apply: Box<dyn Fn(&Bytes) -> Bytes + Send + Sync>,
    tx: mpsc::Sender<AnyBuffer>,
    rx: Mutex<Option<mpsc::Receiver<AnyBuffer>>>,
}

impl TransformFilter {
    pub fn new(
        id: impl Into<String>,
        apply: impl Fn(&Bytes) -> Bytes + Send + Sync + 'static,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(16);
        Arc::new(Self {
            id: id.into(),
            apply: Box::new(apply),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }
}

impl Element for TransformFilter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Filter
    }
}

#[async_trait]
impl Source for TransformFilter {
    fn output_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::OutputDefault).then(BufferType::of::<Bytes>)
    }

    fn open(&self, pad: &PadRef) -> Result<BufferStream, PipelineError> {
        if *pad != PadRef::OutputDefault {
            return Err(PipelineError::PadNotFound {
                element: self.id.clone(),
                direction: "output",
                pad: pad.clone(),
            });
        }
        take_receiver(&self.id, pad, &self.rx)
    }
}

#[async_trait]
impl Sink for TransformFilter {
    fn input_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::InputDefault).then(BufferType::of::<Bytes>)
    }

    async fn handle(
        &self,
        _ctx: PipelineHandle,
        _pad: &PadRef,
        input: AnyBuffer,
    ) -> Result<(), ElementError> {
        let payload = downcast::<Bytes>(&input)
            .ok_or_else(|| ElementError::new("unexpected buffer type"))?;
        let transformed = (self.apply)(payload);
        self.tx
            .send(buffer(transformed))
            .await
            .map_err(|_| ElementError::new("output pad closed"))
    }
}

impl Filter for TransformFilter {}

/// Batches `capacity` inputs into one concatenated output buffer.
pub struct BufferingFilter {
    id: String,
    capacity: usize,
    pending: Mutex<Vec<Bytes>>,
    tx: mpsc::Sender<AnyBuffer>,
    rx: Mutex<Option<mpsc::Receiver<AnyBuffer>>>,
}

impl BufferingFilter {
    pub fn new(id: impl Into<String>, capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(16);
        Arc::new(Self {
            id: id.into(),
            capacity: capacity.max(1),
            pending: Mutex::new(Vec::new()),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }
}

impl Element for BufferingFilter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Filter
    }
}

#[async_trait]
impl Source for BufferingFilter {
    fn output_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::OutputDefault).then(BufferType::of::<Bytes>)
    }

    fn open(&self, pad: &PadRef) -> Result<BufferStream, PipelineError> {
        if *pad != PadRef::OutputDefault {
            return Err(PipelineError::PadNotFound {
                element: self.id.clone(),
                direction: "output",
                pad: pad.clone(),
            });
        }
        take_receiver(&self.id, pad, &self.rx)
    }
}

#[async_trait]
impl Sink for BufferingFilter {
    fn input_type(&self, pad: &PadRef) -> Option<BufferType> {
        (*pad == PadRef::InputDefault).then(BufferType::of::<Bytes>)
    }

    async fn handle(
        &self,
        _ctx: PipelineHandle,
        _pad: &PadRef,
        input: AnyBuffer,
    ) -> Result<(), ElementError> {
        let payload = downcast::<Bytes>(&input)
            .ok_or_else(|| ElementError::new("unexpected buffer type"))?;

        let batch = {
            let mut pending = self.pending.lock();
            pending.push(payload.clone());
            if pending.len() < self.capacity {
                return Ok(());
            }
            std::mem::take(&mut *pending)
        };

        let total: usize = batch.iter().map(|b| b.len()).sum();
        let mut merged = BytesMut::with_capacity(total);
        for part in &batch {
            merged.put_slice(part);
        }

        self.tx
            .send(buffer(merged.freeze()))
            .await
            .map_err(|_| ElementError::new("output pad closed"))
    }
}

impl Filter for BufferingFilter {}

/// Source with two custom output pads, `a` and `b`, each producing its own
/// numbered payloads.
pub struct MultiOutSource {
    id: String,
    interval: Duration,
    count: usize,
}

impl MultiOutSource {
    pub const PAD_A: &'static str = "a";
    pub const PAD_B: &'static str = "b";

    pub fn new(id: impl Into<String>, interval: Duration, count: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            interval,
            count,
        })
    }

    fn is_known(pad: &PadRef) -> bool {
        matches!(pad, PadRef::Custom(name) if name == Self::PAD_A || name == Self::PAD_B)
    }
}

impl Element for MultiOutSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Source
    }
}

#[async_trait]
impl Source for MultiOutSource {
    fn output_pads(&self) -> Vec<PadRef> {
        vec![PadRef::custom(Self::PAD_A), PadRef::custom(Self::PAD_B)]
    }

    fn output_type(&self, pad: &PadRef) -> Option<BufferType> {
        Self::is_known(pad).then(BufferType::of::<Bytes>)
    }

    fn open(&self, pad: &PadRef) -> Result<BufferStream, PipelineError> {
        if !Self::is_known(pad) {
            return Err(PipelineError::PadNotFound {
                element: self.id.clone(),
                direction: "output",
                pad: pad.clone(),
            });
        }

        let interval = self.interval;
        let count = self.count;
        let label = format!("{}-{}", self.id, pad);

        Ok(Box::pin(stream::unfold(0usize, move |n| {
            let label = label.clone();
            async move {
                if n >= count {
                    return None;
                }
                tokio::time::sleep(interval).await;
                let payload = Bytes::from(format!("{label}-{n}"));
                Some((buffer(payload), n + 1))
            }
        })))
    }
}
